//! eBPF trace span poller (spec 4.6, 8.2). Spans are inserted, never
//! updated - `metrics_store::batch_insert_trace_spans` marks every
//! non-PK column immutable, so a re-delivered span after a checkpoint
//! replay is a silent `ON CONFLICT DO NOTHING` rather than a duplicate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::models::TraceSpan;
use crate::poller::base::PollCycle;
use crate::poller::gap_detect::detect_gaps;
use crate::poller::{now, reconcile_session, record_gaps, resume_point};
use crate::registry::{pollable_agents, AgentRegistry};
use crate::store::metrics_store;
use crate::store::retry::with_conflict_retry;
use crate::store::Store;

const DATA_TYPE: &str = "traces";

pub struct TracePoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl TracePoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for TracePoller {
    fn name(&self) -> &str {
        "traces"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_traces(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling traces");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for traces");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_traces(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying traces after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for traces (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.start_time_ms)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let spans: Vec<TraceSpan> = response
                .records
                .iter()
                .map(|r| TraceSpan {
                    trace_id: r.trace_id.clone(),
                    span_id: r.span_id.clone(),
                    parent_span_id: r.parent_span_id.clone(),
                    agent_id: agent.agent_id.clone(),
                    service_name: r.service_name.clone(),
                    span_name: r.span_name.clone(),
                    span_kind: r.span_kind.clone(),
                    start_time: crate::aggregate::from_millis(r.start_time_ms),
                    duration_us: r.duration_us,
                    status_code: r.status_code.clone(),
                    attributes: r.attributes.clone(),
                })
                .collect();
            let max_seq_id = response.max_seq_id;
            let session_id = response.session_id.clone();
            let agent_id = agent.agent_id.clone();

            let commit = || {
                let spans = spans.clone();
                let session_id = session_id.clone();
                let agent_id = agent_id.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    metrics_store::batch_insert_trace_spans(&mut tx, &spans).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit trace span batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = spans.len(), "committed trace span batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.trace_retention_days as i64);
        let cutoff = now() - retention;
        let deleted = sqlx::query("DELETE FROM beyla_traces WHERE start_time < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?
            .rows_affected();
        if deleted > 0 {
            info!(deleted, "pruned aged-out trace spans");
        }
        Ok(())
    }
}
