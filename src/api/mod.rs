mod handlers;
mod routes;
mod types;

pub use routes::create_router;
pub use types::{ApiError, ListParams};
