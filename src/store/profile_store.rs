//! CPU/memory profile summary upserts. `stack_frame_ids` and `stack_hash`
//! are determined entirely by the key (spec 3) so they ride in as
//! immutable, non-conflict-target columns rather than part of the PK
//! itself - only `(bucket, agent, service, build_id, stack_hash)` is PK.

use sqlx::{Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::{BinaryMetadata, CpuProfileSummary, MemoryProfileSummary};
use crate::store::sql::{immutable, mutable, pk, upsert_sql, Column, QueryTimer};

fn cpu_columns() -> Vec<Column> {
    vec![
        pk("bucket_time"),
        pk("agent_id"),
        pk("service_name"),
        pk("build_id"),
        pk("stack_hash"),
        immutable("stack_frame_ids"),
        mutable("sample_count"),
    ]
}

pub async fn batch_upsert_cpu(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[CpuProfileSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("cpu_profile_summaries", &cpu_columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.bucket_time)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.build_id)
            .bind(&row.stack_hash)
            .bind(&row.stack_frame_ids)
            .bind(row.sample_count)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}

fn memory_columns() -> Vec<Column> {
    vec![
        pk("bucket_time"),
        pk("agent_id"),
        pk("service_name"),
        pk("build_id"),
        pk("stack_hash"),
        immutable("stack_frame_ids"),
        mutable("alloc_bytes"),
        mutable("alloc_objects"),
    ]
}

pub async fn batch_upsert_memory(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[MemoryProfileSummary],
) -> ColonyResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = upsert_sql("memory_profile_summaries", &memory_columns());
    for row in rows {
        let _t = QueryTimer::start(&sql);
        sqlx::query(&sql)
            .bind(row.bucket_time)
            .bind(&row.agent_id)
            .bind(&row.service_name)
            .bind(&row.build_id)
            .bind(&row.stack_hash)
            .bind(&row.stack_frame_ids)
            .bind(row.alloc_bytes)
            .bind(row.alloc_objects)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
    }
    Ok(())
}

fn binary_columns() -> Vec<Column> {
    vec![
        pk("build_id"),
        immutable("first_seen"),
        immutable("binary_path"),
        immutable("service_name"),
        mutable("last_seen"),
        mutable("has_debug_info"),
    ]
}

pub async fn upsert_binary_metadata(
    tx: &mut Transaction<'_, Postgres>,
    row: &BinaryMetadata,
) -> ColonyResult<()> {
    let sql = upsert_sql("binary_metadata_registry", &binary_columns());
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(&row.build_id)
        .bind(row.first_seen)
        .bind(&row.binary_path)
        .bind(&row.service_name)
        .bind(row.last_seen)
        .bind(row.has_debug_info)
        .execute(&mut **tx)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}
