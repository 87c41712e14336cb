pub mod aggregate;
pub mod api;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod frame_dict;
pub mod gap_recovery;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod registry;
pub mod store;
