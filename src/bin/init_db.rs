use anyhow::Result;

use colony::config::{validate_database_settings, validate_required_env_vars, Settings};
use colony::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    validate_required_env_vars()?;

    let settings = Settings::new()?;
    validate_database_settings(&settings)?;

    Store::open(&settings.database, false).await?;
    println!("Database schema initialized successfully");

    Ok(())
}
