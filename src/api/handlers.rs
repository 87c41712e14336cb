//! Bounded read handlers over the colony store (spec.md §1's "serves
//! bounded queries against that store"). Every handler takes a
//! [`ListParams`] and never returns more than [`crate::api::types::MAX_LIMIT`]
//! rows - there is no unbounded "give me everything" endpoint by design.

use axum::extract::{Query, State};
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;

use super::types::{ApiError, ListParams};
use crate::models::{
    CpuProfileSummary, GrpcMetricSummary, HttpMetricSummary, MemoryProfileSummary, OtelSummary, SequenceGap,
    SqlMetricSummary, SystemMetricSummary,
};

pub async fn get_http_metrics(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<HttpMetricSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, HttpMetricSummary>(
        "SELECT timestamp_bucket, agent_id, service_name, http_method, http_route, http_status_code, \
                latency_bucket_ms, count, attributes \
         FROM beyla_http_metrics \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY timestamp_bucket DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_grpc_metrics(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<GrpcMetricSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, GrpcMetricSummary>(
        "SELECT timestamp_bucket, agent_id, service_name, grpc_method, grpc_status_code, \
                latency_bucket_ms, count, attributes \
         FROM beyla_grpc_metrics \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY timestamp_bucket DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_sql_metrics(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SqlMetricSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, SqlMetricSummary>(
        "SELECT timestamp_bucket, agent_id, service_name, sql_operation, table_name, \
                latency_bucket_ms, count, attributes \
         FROM beyla_sql_metrics \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY timestamp_bucket DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_otel_summaries(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OtelSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, OtelSummary>(
        "SELECT bucket_time, agent_id, service_name, span_kind, p50_ms, p95_ms, p99_ms, \
                error_count, total_spans, sample_traces, created_at \
         FROM otel_summaries \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY bucket_time DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_cpu_profiles(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CpuProfileSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, CpuProfileSummary>(
        "SELECT bucket_time, agent_id, service_name, build_id, stack_hash, stack_frame_ids, sample_count \
         FROM cpu_profile_summaries \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY bucket_time DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_memory_profiles(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MemoryProfileSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, MemoryProfileSummary>(
        "SELECT bucket_time, agent_id, service_name, build_id, stack_hash, stack_frame_ids, alloc_bytes, alloc_objects \
         FROM memory_profile_summaries \
         WHERE ($1::text IS NULL OR agent_id = $1) AND ($2::text IS NULL OR service_name = $2) \
         ORDER BY bucket_time DESC LIMIT $3",
    )
    .bind(&params.agent_id)
    .bind(&params.service_name)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

pub async fn get_system_metrics(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SystemMetricSummary>>, ApiError> {
    let rows = sqlx::query_as::<_, SystemMetricSummary>(
        "SELECT bucket_time, agent_id, metric_name, attributes_json, min_value, max_value, avg_value, \
                p95_value, delta_value, sample_count, unit, metric_type \
         FROM system_metrics_summaries \
         WHERE ($1::text IS NULL OR agent_id = $1) \
         ORDER BY bucket_time DESC LIMIT $2",
    )
    .bind(&params.agent_id)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}

/// Outstanding gaps (spec 4.4's `status ∈ {detected, recovering}` set),
/// the same window the gap recovery service itself polls from - this
/// just exposes it for operators rather than consuming it into a retry.
pub async fn get_pending_gaps(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SequenceGap>>, ApiError> {
    let rows = sqlx::query_as::<_, SequenceGap>(
        "SELECT id, agent_id, data_type, start_seq_id, end_seq_id, detected_at, recovered_at, \
                status, recovery_attempts, last_recovery_attempt \
         FROM sequence_gaps \
         WHERE status IN ('detected', 'recovering') AND ($1::text IS NULL OR agent_id = $1) \
         ORDER BY detected_at DESC LIMIT $2",
    )
    .bind(&params.agent_id)
    .bind(params.bounded_limit())
    .fetch_all(&*pool)
    .await?;
    Ok(Json(rows))
}
