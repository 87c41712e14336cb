//! Batch upsert for the three RED metric summary tables (spec 3, 6.3).
//! Every key column (the full PK tuple) is `pk`; `count` is the only
//! mutable column; `attributes` rides along as mutable too since it carries
//! no index.

use sqlx::{Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::{GrpcMetricSummary, HttpMetricSummary, SqlMetricSummary};
use crate::store::sql::{immutable as imm, mutable, pk, upsert_sql, Column, QueryTimer};

fn http_columns() -> Vec<Column> {
    vec![
        pk("timestamp_bucket"),
        pk("agent_id"),
        pk("service_name"),
        pk("http_method"),
        pk("http_route"),
        pk("http_status_code"),
        pk("latency_bucket_ms"),
        mutable("count"),
        mutable("attributes"),
    ]
}

pub async fn batch_upsert_http(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[HttpMetricSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("beyla_http_metrics", &http_columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.timestamp_bucket)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.http_method)
            .bind(&row.http_route)
            .bind(row.http_status_code)
            .bind(row.latency_bucket_ms)
            .bind(row.count)
            .bind(&row.attributes)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}

fn grpc_columns() -> Vec<Column> {
    vec![
        pk("timestamp_bucket"),
        pk("agent_id"),
        pk("service_name"),
        pk("grpc_method"),
        pk("grpc_status_code"),
        pk("latency_bucket_ms"),
        mutable("count"),
        mutable("attributes"),
    ]
}

pub async fn batch_upsert_grpc(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[GrpcMetricSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("beyla_grpc_metrics", &grpc_columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.timestamp_bucket)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.grpc_method)
            .bind(row.grpc_status_code)
            .bind(row.latency_bucket_ms)
            .bind(row.count)
            .bind(&row.attributes)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}

fn sql_columns() -> Vec<Column> {
    vec![
        pk("timestamp_bucket"),
        pk("agent_id"),
        pk("service_name"),
        pk("sql_operation"),
        pk("table_name"),
        pk("latency_bucket_ms"),
        mutable("count"),
        mutable("attributes"),
    ]
}

pub async fn batch_upsert_sql(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[SqlMetricSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("beyla_sql_metrics", &sql_columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.timestamp_bucket)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.sql_operation)
            .bind(&row.table_name)
            .bind(row.latency_bucket_ms)
            .bind(row.count)
            .bind(&row.attributes)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}

/// Trace spans are insert-once (spec 3: "none (insert-once)"); the PK
/// tuple is the only conflict target and the upsert is a no-op on repeat
/// delivery, which is exactly `ON CONFLICT DO NOTHING`.
pub async fn insert_trace_span(
    tx: &mut Transaction<'_, Postgres>,
    span: &crate::models::TraceSpan,
) -> ColonyResult<()> {
    let columns = vec![
        pk("trace_id"),
        pk("span_id"),
        imm("parent_span_id"),
        imm("agent_id"),
        imm("service_name"),
        imm("span_name"),
        imm("span_kind"),
        imm("start_time"),
        imm("duration_us"),
        imm("status_code"),
        imm("attributes"),
    ];
    let sql = upsert_sql("beyla_traces", &columns);
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(&span.trace_id)
        .bind(&span.span_id)
        .bind(&span.parent_span_id)
        .bind(&span.agent_id)
        .bind(&span.service_name)
        .bind(&span.span_name)
        .bind(&span.span_kind)
        .bind(span.start_time)
        .bind(span.duration_us)
        .bind(&span.status_code)
        .bind(&span.attributes)
        .execute(&mut **tx)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}

pub async fn batch_insert_trace_spans(
    tx: &mut Transaction<'_, Postgres>,
    spans: &[crate::models::TraceSpan],
) -> ColonyResult<()> {
    for span in spans {
        insert_trace_span(tx, span).await?;
    }
    Ok(())
}
