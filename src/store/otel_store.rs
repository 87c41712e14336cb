use sqlx::{Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::OtelSummary;
use crate::store::sql::{mutable, pk, upsert_sql, Column, QueryTimer};

fn columns() -> Vec<Column> {
    vec![
        pk("bucket_time"),
        pk("agent_id"),
        pk("service_name"),
        pk("span_kind"),
        mutable("p50_ms"),
        mutable("p95_ms"),
        mutable("p99_ms"),
        mutable("error_count"),
        mutable("total_spans"),
        mutable("sample_traces"),
    ]
}

pub async fn batch_upsert(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[OtelSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("otel_summaries", &columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.bucket_time)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.span_kind)
            .bind(row.p50_ms)
            .bind(row.p95_ms)
            .bind(row.p99_ms)
            .bind(row.error_count)
            .bind(row.total_spans)
            .bind(&row.sample_traces)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}
