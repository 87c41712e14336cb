use sqlx::{Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::SystemMetricSummary;
use crate::store::sql::{mutable, pk, upsert_sql, Column, QueryTimer};

fn columns() -> Vec<Column> {
    vec![
        pk("bucket_time"),
        pk("agent_id"),
        pk("metric_name"),
        pk("attributes_json"),
        mutable("min_value"),
        mutable("max_value"),
        mutable("avg_value"),
        mutable("p95_value"),
        mutable("delta_value"),
        mutable("sample_count"),
        mutable("unit"),
        mutable("metric_type"),
    ]
}

pub async fn batch_upsert(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[SystemMetricSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("system_metrics_summaries", &columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.bucket_time)
            .bind(&row.agent_id)
            .bind(&row.metric_name)
            .bind(&row.attributes_json)
            .bind(row.min_value)
            .bind(row.max_value)
            .bind(row.avg_value)
            .bind(row.p95_value)
            .bind(row.delta_value)
            .bind(row.sample_count)
            .bind(&row.unit)
            .bind(&row.metric_type)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}
