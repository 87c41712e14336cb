//! OTEL span summary poller (spec 4.3, 4.6, 8.2).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::aggregate::otel::{aggregate_spans, RawSpan};
use crate::checkpoint::CheckpointStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::poller::base::PollCycle;
use crate::poller::gap_detect::detect_gaps;
use crate::poller::{now, reconcile_session, record_gaps, resume_point};
use crate::registry::{pollable_agents, AgentRegistry};
use crate::store::otel_store;
use crate::store::retry::with_conflict_retry;
use crate::store::Store;

const DATA_TYPE: &str = "otel_spans";

pub struct OtelSpanPoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
}

impl OtelSpanPoller {
    pub fn new(store: Store, registry: Arc<dyn AgentRegistry>, client: Arc<dyn AgentClient>, settings: Arc<Settings>) -> Self {
        Self { store, registry, client, settings }
    }
}

#[async_trait]
impl PollCycle for OtelSpanPoller {
    fn name(&self) -> &str {
        "otel_spans"
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
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling otel spans");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for otel spans");
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
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying otel spans after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for otel spans (post-reset)");
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

            let raw: Vec<RawSpan> = response
                .records
                .iter()
                .map(|r| RawSpan {
                    trace_id: r.trace_id.clone(),
                    service_name: r.service_name.clone(),
                    span_kind: r.span_kind.clone(),
                    start_time_ms: r.start_time_ms,
                    duration_us: r.duration_us,
                    is_error: r.status_code != "OK" && !r.status_code.is_empty(),
                })
                .collect();
            let summaries = aggregate_spans(&agent.agent_id, &raw);
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
                    otel_store::batch_upsert(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit otel span summary batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = summaries.len(), "committed otel span summary batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::hours(self.settings.poller.otel_retention_hours as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM otel_summaries WHERE bucket_time < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}
