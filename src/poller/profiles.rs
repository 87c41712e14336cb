//! CPU/memory profile pollers (spec 4.2, 4.6). Stack frame names are
//! resolved through the shared [`FrameDictionary`] before aggregation,
//! which is the one I/O step the otherwise-pure `aggregate::profile`
//! functions don't perform themselves.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::aggregate::profile::{aggregate_cpu, aggregate_memory, RawCpuSample, RawMemorySample};
use crate::checkpoint::CheckpointStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::frame_dict::FrameDictionary;
use crate::models::BinaryMetadata;
use crate::poller::base::PollCycle;
use crate::poller::gap_detect::detect_gaps;
use crate::poller::{now, reconcile_session, record_gaps, resume_point};
use crate::registry::{pollable_agents, AgentRegistry};
use crate::store::profile_store;
use crate::store::retry::with_conflict_retry;
use crate::store::Store;

const CPU_DATA_TYPE: &str = "cpu_profile";
const MEMORY_DATA_TYPE: &str = "memory_profile";

pub struct CpuProfilePoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
    frames: Arc<FrameDictionary>,
}

impl CpuProfilePoller {
    pub fn new(
        store: Store,
        registry: Arc<dyn AgentRegistry>,
        client: Arc<dyn AgentClient>,
        settings: Arc<Settings>,
        frames: Arc<FrameDictionary>,
    ) -> Self {
        Self { store, registry, client, settings, frames }
    }
}

#[async_trait]
impl PollCycle for CpuProfilePoller {
    fn name(&self) -> &str {
        "cpu_profile"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, CPU_DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_cpu_profiles(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling cpu profiles");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for cpu profiles");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, CPU_DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_cpu_profiles(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying cpu profiles after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for cpu profiles (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, CPU_DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let mut raw = Vec::with_capacity(response.records.len());
            let mut binaries: Vec<BinaryMetadata> = Vec::new();
            let now_ts = now();
            for record in &response.records {
                let frame_ids = match self.frames.encode(&record.stack_frames).await {
                    Ok(ids) => ids,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "failed to encode cpu profile frames, skipping sample");
                        continue;
                    }
                };
                binaries.push(BinaryMetadata {
                    build_id: record.build_id.clone(),
                    service_name: record.service_name.clone(),
                    binary_path: String::new(),
                    first_seen: now_ts,
                    last_seen: now_ts,
                    has_debug_info: false,
                });
                raw.push(RawCpuSample {
                    timestamp_ms: record.timestamp,
                    service_name: record.service_name.clone(),
                    build_id: record.build_id.clone(),
                    frame_ids,
                    sample_count: record.sample_count,
                });
            }

            let summaries = aggregate_cpu(&agent.agent_id, &raw);
            let max_seq_id = response.max_seq_id;
            let session_id = response.session_id.clone();
            let agent_id = agent.agent_id.clone();

            let commit = || {
                let summaries = summaries.clone();
                let binaries = binaries.clone();
                let session_id = session_id.clone();
                let agent_id = agent_id.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    profile_store::batch_upsert_cpu(&mut tx, &summaries).await?;
                    for binary in &binaries {
                        profile_store::upsert_binary_metadata(&mut tx, binary).await?;
                    }
                    CheckpointStore::update_tx(&mut tx, &agent_id, CPU_DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit cpu profile batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = summaries.len(), "committed cpu profile batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.profile_retention_days as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM cpu_profile_summaries WHERE bucket_time < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        self.frames.sweep().await.map_err(anyhow::Error::from)?;
        Ok(())
    }
}

pub struct MemoryProfilePoller {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    settings: Arc<Settings>,
    frames: Arc<FrameDictionary>,
}

impl MemoryProfilePoller {
    pub fn new(
        store: Store,
        registry: Arc<dyn AgentRegistry>,
        client: Arc<dyn AgentClient>,
        settings: Arc<Settings>,
        frames: Arc<FrameDictionary>,
    ) -> Self {
        Self { store, registry, client, settings, frames }
    }
}

#[async_trait]
impl PollCycle for MemoryProfilePoller {
    fn name(&self) -> &str {
        "memory_profile"
    }

    async fn poll_once(&self) -> anyhow::Result<()> {
        let agents = pollable_agents(self.registry.list().await?, now());
        let max_records = self.settings.poller.max_records;
        let gap_grace = ChronoDuration::from_std(self.settings.poller.gap_grace()).unwrap_or(ChronoDuration::seconds(10));

        for agent in agents {
            let resume_from = resume_point(self.store.pool(), &agent.agent_id, MEMORY_DATA_TYPE).await.unwrap_or(0);

            let response = match self
                .client
                .poll_memory_profiles(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: resume_from, max_records })
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(agent_id = %agent.agent_id, error = %err, "transport error polling memory profiles");
                    continue;
                }
            };

            if let Some(message) = &response.error {
                warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for memory profiles");
                continue;
            }

            let (effective_resume, session_changed) =
                reconcile_session(self.store.pool(), &agent.agent_id, MEMORY_DATA_TYPE, &response.session_id)
                    .await
                    .unwrap_or((resume_from, false));

            let response = if session_changed {
                match self
                    .client
                    .poll_memory_profiles(&agent.agent_id, &agent.endpoint, PollRequest { start_seq_id: 0, max_records })
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "transport error re-querying memory profiles after session reset");
                        continue;
                    }
                }
            } else {
                response
            };

            if session_changed {
                if let Some(message) = &response.error {
                    warn!(agent_id = %agent.agent_id, message = %message, "agent reported application error for memory profiles (post-reset)");
                    continue;
                }
            }

            let stamped: Vec<(u64, chrono::DateTime<chrono::Utc>)> = response
                .records
                .iter()
                .map(|r| (r.seq_id, crate::aggregate::from_millis(r.timestamp)))
                .collect();
            let gaps = detect_gaps(effective_resume, &stamped, now(), gap_grace);
            record_gaps(self.store.pool(), &agent.agent_id, MEMORY_DATA_TYPE, &gaps).await;

            if response.records.is_empty() {
                continue;
            }

            let mut raw = Vec::with_capacity(response.records.len());
            for record in &response.records {
                let frame_ids = match self.frames.encode(&record.stack_frames).await {
                    Ok(ids) => ids,
                    Err(err) => {
                        warn!(agent_id = %agent.agent_id, error = %err, "failed to encode memory profile frames, skipping sample");
                        continue;
                    }
                };
                raw.push(RawMemorySample {
                    timestamp_ms: record.timestamp,
                    service_name: record.service_name.clone(),
                    build_id: record.build_id.clone(),
                    frame_ids,
                    alloc_bytes: record.alloc_bytes,
                    alloc_objects: record.alloc_objects,
                });
            }

            let summaries = aggregate_memory(&agent.agent_id, &raw);
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
                    profile_store::batch_upsert_memory(&mut tx, &summaries).await?;
                    CheckpointStore::update_tx(&mut tx, &agent_id, MEMORY_DATA_TYPE, &session_id, max_seq_id as i64).await?;
                    tx.commit().await.map_err(ColonyError::from)?;
                    Ok::<(), ColonyError>(())
                }
            };

            if let Err(err) = with_conflict_retry(commit).await {
                warn!(agent_id = %agent.agent_id, error = %err, "failed to commit memory profile batch");
            } else {
                info!(agent_id = %agent.agent_id, rows = summaries.len(), "committed memory profile batch");
            }
        }

        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = ChronoDuration::days(self.settings.poller.profile_retention_days as i64);
        let cutoff = now() - retention;
        sqlx::query("DELETE FROM memory_profile_summaries WHERE bucket_time < $1")
            .bind(cutoff)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }
}
