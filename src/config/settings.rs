use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub poller: PollerSettings,
    pub gap_recovery: GapRecoverySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
    #[serde(default = "default_cors_origin")]
    pub cors_allow_origin: String,
    #[serde(default = "default_cors_methods")]
    pub cors_allow_methods: String,
    #[serde(default = "default_cors_headers")]
    pub cors_allow_headers: String,
}

// Default functions for CORS settings
fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_cors_methods() -> String {
    "GET, POST, OPTIONS".to_string()
}

fn default_cors_headers() -> String {
    "Content-Type, Authorization".to_string()
}

/// Tunables shared by every typed poller (spec 4.5-4.8); a single set today,
/// but split out so a future per-data-type override doesn't reshuffle callers.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_gap_grace_secs")]
    pub gap_grace_secs: u64,
    #[serde(default = "default_max_records")]
    pub max_records: u32,
    #[serde(default = "default_red_retention_days")]
    pub red_retention_days: u64,
    #[serde(default = "default_trace_retention_days")]
    pub trace_retention_days: u64,
    #[serde(default = "default_profile_retention_days")]
    pub profile_retention_days: u64,
    #[serde(default = "default_otel_retention_hours")]
    pub otel_retention_hours: u64,
    #[serde(default = "default_system_metric_retention_days")]
    pub system_metric_retention_days: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_gap_grace_secs() -> u64 {
    10
}

fn default_max_records() -> u32 {
    1000
}

fn default_red_retention_days() -> u64 {
    7
}

fn default_trace_retention_days() -> u64 {
    7
}

fn default_profile_retention_days() -> u64 {
    30
}

fn default_otel_retention_hours() -> u64 {
    24
}

fn default_system_metric_retention_days() -> u64 {
    30
}

impl PollerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn gap_grace(&self) -> Duration {
        Duration::from_secs(self.gap_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GapRecoverySettings {
    #[serde(default = "default_gap_recovery_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: i32,
    #[serde(default = "default_gap_retention_days")]
    pub gap_retention_days: u64,
}

fn default_gap_recovery_interval_secs() -> u64 {
    300
}

fn default_max_recovery_attempts() -> i32 {
    3
}

fn default_gap_retention_days() -> u64 {
    7
}

impl GapRecoverySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Environment::default().separator("__"))
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8090)?
            .build()?;

        config.try_deserialize()
    }
}
