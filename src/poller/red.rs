//! HTTP/gRPC/SQL RED metric pollers (spec 4.6 steps 1-5, 8.2's data types).
//! All three follow the same cycle shape; they're kept as separate structs
//! rather than one generic poller because each has its own RPC method,
//! aggregator, and upsert function with no shared trait to hang a generic
//! off of - the same way the teacher keeps `block_processor` and
//! `realtime_processor` as separate concrete types rather than one generic
//! processor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::aggregate::red::{aggregate_grpc, aggregate_http, aggregate_sql, RawGrpcMetric, RawHttpMetric, RawSqlMetric};
use crate::checkpoint::CheckpointStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::poller::base::PollCycle;
use crate::poller::gap_detect::detect_gaps;
use crate::poller::{now, reconcile_session, record_gaps, resume_point};
use crate::registry::{pollable_agents, AgentRegistry};
use crate::store::metrics_store;
use crate::store::retry::with_conflict_retry;
use crate::store::Store;

const HTTP_DATA_TYPE: &str = "http_red";
const GRPC_DATA_TYPE: &str = "grpc_red";
const SQL_DATA_TYPE: &str = "sql_red";

pub struct HttpRedPoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl HttpRedPoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for HttpRedPoller {
    fn name(&self) -> &str {
        "http_red"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, HTTP_DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_http_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling http metrics");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for http metrics");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, HTTP_DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_http_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying http metrics after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for http metrics (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp_ms)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, HTTP_DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let raw: Vec<RawHttpMetric> = response
                .records
                .iter()
                .map(|r| RawHttpMetric {
                    timestamp_ms: r.timestamp_ms,
                    service_name: r.service_name.clone(),
                    http_method: r.http_method.clone(),
                    http_route: r.http_route.clone(),
                    http_status_code: r.http_status_code,
                    latency_buckets: r.latency_buckets.clone(),
                    latency_counts: r.latency_counts.clone(),
                    attributes: r.attributes.clone(),
                })
                .collect();
            let summaries = aggregate_http(&agent.agent_id, &raw);
            let max_seq_id = response.max_seq_id;
            let session_id = response.session_id.clone();
            let agent_id = agent.agent_id.clone();

            let commit = || {
                let summaries = summaries.clone();
                let session_id = session_id.clone();
                let agent_id = agent_id.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    metrics_store::batch_upsert_http(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, HTTP_DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit http metric batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = raw.len(), "committed http metric batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.red_retention_days as i64);
        let cutoff = now() - retention;
        let deleted = sqlx::query("DELETE FROM beyla_http_metrics WHERE timestamp_bucket < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(deleted, "pruned aged-out http metric summaries");
        }
        Ok(())
    }
}

pub struct GrpcRedPoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl GrpcRedPoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for GrpcRedPoller {
    fn name(&self) -> &str {
        "grpc_red"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, GRPC_DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_grpc_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling grpc metrics");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for grpc metrics");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, GRPC_DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_grpc_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying grpc metrics after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for grpc metrics (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp_ms)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, GRPC_DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let raw: Vec<RawGrpcMetric> = response
                .records
                .iter()
                .map(|r| RawGrpcMetric {
                    timestamp_ms: r.timestamp_ms,
                    service_name: r.service_name.clone(),
                    grpc_method: r.grpc_method.clone(),
                    grpc_status_code: r.grpc_status_code,
                    latency_buckets: r.latency_buckets.clone(),
                    latency_counts: r.latency_counts.clone(),
                    attributes: r.attributes.clone(),
                })
                .collect();
            let summaries = aggregate_grpc(&agent.agent_id, &raw);
            let max_seq_id = response.max_seq_id;
            let session_id = response.session_id.clone();
            let agent_id = agent.agent_id.clone();

            let commit = || {
                let summaries = summaries.clone();
                let session_id = session_id.clone();
                let agent_id = agent_id.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    metrics_store::batch_upsert_grpc(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, GRPC_DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit grpc metric batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.red_retention_days as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM beyla_grpc_metrics WHERE timestamp_bucket < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}

pub struct SqlRedPoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl SqlRedPoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for SqlRedPoller {
    fn name(&self) -> &str {
        "sql_red"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, SQL_DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_sql_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling sql metrics");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for sql metrics");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, SQL_DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_sql_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying sql metrics after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for sql metrics (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp_ms)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, SQL_DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let raw: Vec<RawSqlMetric> = response
                .records
                .iter()
                .map(|r| RawSqlMetric {
                    timestamp_ms: r.timestamp_ms,
                    service_name: r.service_name.clone(),
                    sql_operation: r.sql_operation.clone(),
                    table_name: r.table_name.clone(),
                    latency_buckets: r.latency_buckets.clone(),
                    latency_counts: r.latency_counts.clone(),
                    attributes: r.attributes.clone(),
                })
                .collect();
            let summaries = aggregate_sql(&agent.agent_id, &raw);
            let max_seq_id = response.max_seq_id;
            let session_id = response.session_id.clone();
            let agent_id = agent.agent_id.clone();

            let commit = || {
                let summaries = summaries.clone();
                let session_id = session_id.clone();
                let agent_id = agent_id.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    metrics_store::batch_upsert_sql(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, SQL_DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit sql metric batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.red_retention_days as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM beyla_sql_metrics WHERE timestamp_bucket < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}
