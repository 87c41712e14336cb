use axum::{routing::get, Router};
use std::sync::Arc;

use sqlx::PgPool;

use crate::api::handlers;

/// The bounded query API (spec.md §1). State is a bare `Arc<PgPool>` since
/// every handler here is a read-only, parameterized `SELECT ... LIMIT`.
pub fn create_router(pool: Arc<PgPool>) -> Router {
    Router::new()
        .route("/api/http-metrics", get(handlers::get_http_metrics))
        .route("/api/otel-summaries", get(handlers::get_otel_summaries))
        .route("/api/cpu-profiles", get(handlers::get_cpu_profiles))
        .route("/api/memory-profiles", get(handlers::get_memory_profiles))
        .route("/api/system-metrics", get(handlers::get_system_metrics))
        .route("/api/gaps", get(handlers::get_pending_gaps))
        .with_state(pool)
}
