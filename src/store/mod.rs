pub mod metrics_store;
pub mod otel_store;
pub mod profile_store;
pub mod registry_store;
pub mod retry;
pub mod schema;
pub mod sql;
pub mod system_metrics_store;

use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgConnectOptions};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};

use crate::config::DatabaseSettings;
use crate::error::{ColonyError, ColonyResult};

/// Connection pool + schema lifecycle, grounded on the teacher's
/// `PgPoolOptions` construction in `main.rs` and `db/schema.rs`.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Opens (creating on first run) the store described by `settings`,
    /// initializing schema unless `read_only` is set (spec 4.1).
    pub async fn open(settings: &DatabaseSettings, read_only: bool) -> anyhow::Result<Self> {
        let connect_options = connect_options(settings);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.min(10))
            .min_connections(settings.min_connections.min(5))
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options)
            .await?;

        // pool construction already pings via the first connection; an
        // explicit probe keeps the "ensures reachability" contract obvious.
        sqlx::query("SELECT 1").execute(&pool).await?;

        let store = Self { pool };

        if !read_only {
            store.initialize_schema().await?;
        }

        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin_tx(&self) -> ColonyResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(ColonyError::from)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::STATEMENTS {
            let _timer = sql::QueryTimer::start(statement);
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("schema initialized ({} statements)", schema::STATEMENTS.len());

        match sqlx::query(schema::VECTOR_INDEX_STATEMENT).execute(&self.pool).await {
            Ok(_) => info!("vector extension available, HNSW index path enabled"),
            Err(err) => warn!(error = %err, "vector extension unavailable, continuing without it"),
        }

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(settings: &DatabaseSettings) -> PgConnectOptions {
    // Cloud SQL Unix-socket deployments pass the socket directory as `host`
    // and expect `host=` to land in the connection options rather than a
    // TCP host/port pair - kept from the teacher's `main.rs` special-case.
    let mut options = PgConnectOptions::new()
        .username(&settings.username)
        .password(&settings.password)
        .database(&settings.database_name);

    if settings.host.starts_with("/cloudsql") {
        options = options.socket(&settings.host);
    } else {
        options = options.host(&settings.host).port(settings.port);
    }

    options
}
