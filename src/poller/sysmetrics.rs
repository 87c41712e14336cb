//! System metrics poller (spec 4.3, 4.6, 8.2).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::aggregate::sysmetrics::{aggregate, RawSystemMetric};
use crate::checkpoint::CheckpointStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::poller::base::PollCycle;
use crate::poller::gap_detect::detect_gaps;
use crate::poller::{now, reconcile_session, record_gaps, resume_point};
use crate::registry::{pollable_agents, AgentRegistry};
use crate::store::system_metrics_store;
use crate::store::retry::with_conflict_retry;
use crate::store::Store;

const DATA_TYPE: &str = "system_metrics";

pub struct SystemMetricsPoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl SystemMetricsPoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for SystemMetricsPoller {
    fn name(&self) -> &str {
        "system_metrics"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_system_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling system metrics");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for system metrics");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_system_metrics(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying system metrics after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for system metrics (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp_ms)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let raw: Vec<RawSystemMetric> = response
                .records
                .iter()
                .map(|r| RawSystemMetric {
                    timestamp_ms: r.timestamp_ms,
                    name: r.name.clone(),
                    value: r.value,
                    unit: r.unit.clone(),
                    metric_type: r.metric_type.clone(),
                    attributes_json: r.attributes_json.clone(),
                })
                .collect();
            let summaries = aggregate(&agent.agent_id, &raw);
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
                    system_metrics_store::batch_upsert(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit system metric batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = summaries.len(), "committed system metric batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.system_metric_retention_days as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM system_metrics_summaries WHERE bucket_time < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}
