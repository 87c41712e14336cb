mod settings;
mod validation;

pub use settings::{ApplicationSettings, DatabaseSettings, GapRecoverySettings, PollerSettings, Settings};
pub use validation::{validate_database_settings, validate_required_env_vars};