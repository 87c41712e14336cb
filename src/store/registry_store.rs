//! Persistence for the service-registry-adjacent tables (spec 3, 9). Split
//! `services` from `service_heartbeats` per spec 9's resolved Open
//! Question: `last_seen` is the highest-frequency write in the system and
//! must not share a row (or an index) with `status`/`labels`, which the
//! engine's indexed-column restriction would otherwise forbid updating
//! alongside a hot column.

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::{AgentIpAllocation, Service, ServiceConnection, ServiceHeartbeat};
use crate::store::sql::{immutable, mutable, pk, upsert_sql, Column, QueryTimer};

fn service_columns() -> Vec<Column> {
    vec![
        pk("id"),
        immutable("name"),
        immutable("app_id"),
        mutable("version"),
        immutable("agent_id"),
        mutable("labels"),
        mutable("status"),
        immutable("registered_at"),
    ]
}

pub async fn upsert_service(tx: &mut Transaction<'_, Postgres>, row: &Service) -> ColonyResult<()> {
    let sql = upsert_sql("services", &service_columns());
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.app_id)
        .bind(&row.version)
        .bind(&row.agent_id)
        .bind(&row.labels)
        .bind(&row.status)
        .bind(row.registered_at)
        .execute(&mut **tx)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}

/// High-frequency heartbeat write, isolated from `services` so it never
/// contends with (or is blocked by) an indexed-column update there.
pub async fn upsert_heartbeat(pool: &PgPool, service_id: &str) -> ColonyResult<()> {
    let columns = vec![pk("service_id"), mutable("last_seen")];
    let sql = upsert_sql("service_heartbeats", &columns);
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(service_id)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}

pub async fn get_heartbeat(pool: &PgPool, service_id: &str) -> ColonyResult<Option<ServiceHeartbeat>> {
    sqlx::query_as::<_, ServiceHeartbeat>(
        "SELECT service_id, last_seen FROM service_heartbeats WHERE service_id = $1",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await
    .map_err(ColonyError::from)
}

/// Upserted on discovery; bumps `connection_count` on repeat observation
/// rather than overwriting it, matching "Upserted on discovery" (spec 3).
pub async fn upsert_connection(
    tx: &mut Transaction<'_, Postgres>,
    row: &ServiceConnection,
) -> ColonyResult<()> {
    let sql = format!(
        "INSERT INTO service_connections (from_service, to_service, protocol, first_observed, last_observed, connection_count) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (from_service, to_service, protocol) DO UPDATE SET \
         last_observed = EXCLUDED.last_observed, \
         connection_count = service_connections.connection_count + EXCLUDED.connection_count"
    );
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(&row.from_service)
        .bind(&row.to_service)
        .bind(&row.protocol)
        .bind(row.first_observed)
        .bind(row.last_observed)
        .bind(row.connection_count)
        .execute(&mut **tx)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}

fn ip_columns() -> Vec<Column> {
    vec![pk("agent_id"), immutable("ip_address"), immutable("allocated_at"), mutable("last_seen")]
}

pub async fn upsert_ip_allocation(pool: &PgPool, row: &AgentIpAllocation) -> ColonyResult<()> {
    let sql = upsert_sql("agent_ip_allocations", &ip_columns());
    let _t = QueryTimer::start(&sql);
    sqlx::query(&sql)
        .bind(&row.agent_id)
        .bind(&row.ip_address)
        .bind(row.allocated_at)
        .bind(row.last_seen)
        .execute(pool)
        .await
        .map_err(ColonyError::from)?;
    Ok(())
}
