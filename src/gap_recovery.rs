//! Gap Recovery Service (spec 4.7): walks the gap ledger and, per gap,
//! re-queries the originating agent for the missing range, aggregates,
//! commits, and resolves the gap. Reuses the [`crate::poller::base`]
//! lifecycle (it's a [`PollCycle`] like any typed poller) but has no
//! cleanup work of its own beyond the terminal-gap retention sweep
//! [`crate::checkpoint::gap::GapStore::cleanup`] already owns (spec 4.8).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::aggregate::otel::{aggregate_spans, RawSpan};
use crate::aggregate::profile::{aggregate_cpu, aggregate_memory, RawCpuSample, RawMemorySample};
use crate::aggregate::red::{aggregate_grpc, aggregate_http, aggregate_sql, RawGrpcMetric, RawHttpMetric, RawSqlMetric};
use crate::aggregate::sysmetrics::{aggregate as aggregate_sysmetrics, RawSystemMetric};
use crate::checkpoint::gap::GapStore;
use crate::client::{AgentClient, PollRequest};
use crate::config::Settings;
use crate::error::ColonyError;
use crate::frame_dict::FrameDictionary;
use crate::models::TraceSpan;
use crate::poller::base::PollCycle;
use crate::registry::AgentRegistry;
use crate::store::retry::with_conflict_retry;
use crate::store::{metrics_store, otel_store, profile_store, system_metrics_store};
use crate::store::Store;

/// Caps a recovery query's window to 10,000 records (spec 4.7 step 4),
/// independent of how wide the detected gap itself is.
const MAX_RECOVERY_RECORDS: u32 = 10_000;

pub struct GapRecoveryService {
    store: Store,
    registry: Arc<dyn AgentRegistry>,
    client: Arc<dyn AgentClient>,
    frames: Arc<FrameDictionary>,
    settings: Arc<Settings>,
}

impl GapRecoveryService {
    pub fn new(
        store: Store,
        registry: Arc<dyn AgentRegistry>,
        client: Arc<dyn AgentClient>,
        frames: Arc<FrameDictionary>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { store, registry, client, frames, settings }
    }

    async fn recover_one(&self, gap: &crate::models::SequenceGap) -> Result<(), ColonyError> {
        let agent = self
            .registry
            .get(&gap.agent_id)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: gap.agent_id.clone(), source: e })?;

        let Some(agent) = agent else {
            return Err(ColonyError::NotFound(format!("agent {} not found for gap recovery", gap.agent_id)));
        };

        let start_seq_id = gap.start_seq_id.saturating_sub(1) as u64;
        let span = (gap.end_seq_id - gap.start_seq_id + 1) as u64;
        let max_records = span.min(MAX_RECOVERY_RECORDS as u64) as u32;
        let req = PollRequest { start_seq_id, max_records };

        match gap.data_type.as_str() {
            "http_red" => self.recover_http(&agent.agent_id, &agent.endpoint, req).await,
            "grpc_red" => self.recover_grpc(&agent.agent_id, &agent.endpoint, req).await,
            "sql_red" => self.recover_sql(&agent.agent_id, &agent.endpoint, req).await,
            "traces" | "otel_spans" => self.recover_traces(&agent.agent_id, &agent.endpoint, req, &gap.data_type).await,
            "cpu_profile" => self.recover_cpu(&agent.agent_id, &agent.endpoint, req).await,
            "memory_profile" => self.recover_memory(&agent.agent_id, &agent.endpoint, req).await,
            "system_metrics" => self.recover_sysmetrics(&agent.agent_id, &agent.endpoint, req).await,
            other => Err(ColonyError::Application {
                agent_id: agent.agent_id.clone(),
                message: format!("no recovery function registered for data type {other}"),
            }),
        }
    }

    async fn recover_http(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_http_metrics(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
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
        let summaries = aggregate_http(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                metrics_store::batch_upsert_http(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }

    async fn recover_grpc(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_grpc_metrics(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
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
        let summaries = aggregate_grpc(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                metrics_store::batch_upsert_grpc(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }

    async fn recover_sql(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_sql_metrics(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
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
        let summaries = aggregate_sql(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                metrics_store::batch_upsert_sql(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }

    /// Traces are recovered two ways depending on which typed poller
    /// detected the gap: the raw-span poller re-inserts the spans
    /// verbatim, the OTEL summary poller re-aggregates them. Both consume
    /// the same agent RPC (spec 6.2's eBPF trace span payload).
    async fn recover_traces(&self, agent_id: &str, endpoint: &str, req: PollRequest, data_type: &str) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_traces(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
        }

        if data_type == "otel_spans" {
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
            let summaries = aggregate_spans(agent_id, &raw);
            with_conflict_retry(|| {
                let summaries = summaries.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    otel_store::batch_upsert(&mut tx, &summaries).await?;
                    tx.commit().await.map_err(ColonyError::from)
                }
            })
            .await
        } else {
            let spans: Vec<TraceSpan> = response
                .records
                .iter()
                .map(|r| TraceSpan {
                    trace_id: r.trace_id.clone(),
                    span_id: r.span_id.clone(),
                    parent_span_id: r.parent_span_id.clone(),
                    agent_id: agent_id.to_string(),
                    service_name: r.service_name.clone(),
                    span_name: r.span_name.clone(),
                    span_kind: r.span_kind.clone(),
                    start_time: crate::aggregate::from_millis(r.start_time_ms),
                    duration_us: r.duration_us,
                    status_code: r.status_code.clone(),
                    attributes: r.attributes.clone(),
                })
                .collect();
            with_conflict_retry(|| {
                let spans = spans.clone();
                let store = self.store.clone();
                async move {
                    let mut tx = store.begin_tx().await?;
                    metrics_store::batch_insert_trace_spans(&mut tx, &spans).await?;
                    tx.commit().await.map_err(ColonyError::from)
                }
            })
            .await
        }
    }

    async fn recover_cpu(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_cpu_profiles(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
        }
        let mut raw = Vec::with_capacity(response.records.len());
        for record in &response.records {
            let frame_ids = self.frames.encode(&record.stack_frames).await?;
            raw.push(RawCpuSample {
                timestamp_ms: record.timestamp,
                service_name: record.service_name.clone(),
                build_id: record.build_id.clone(),
                frame_ids,
                sample_count: record.sample_count,
            });
        }
        let summaries = aggregate_cpu(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                profile_store::batch_upsert_cpu(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }

    async fn recover_memory(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_memory_profiles(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
        }
        let mut raw = Vec::with_capacity(response.records.len());
        for record in &response.records {
            let frame_ids = self.frames.encode(&record.stack_frames).await?;
            raw.push(RawMemorySample {
                timestamp_ms: record.timestamp,
                service_name: record.service_name.clone(),
                build_id: record.build_id.clone(),
                frame_ids,
                alloc_bytes: record.alloc_bytes,
                alloc_objects: record.alloc_objects,
            });
        }
        let summaries = aggregate_memory(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                profile_store::batch_upsert_memory(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }

    async fn recover_sysmetrics(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> Result<(), ColonyError> {
        let response = self
            .client
            .poll_system_metrics(agent_id, endpoint, req)
            .await
            .map_err(|e| ColonyError::Transport { agent_id: agent_id.to_string(), source: e })?;
        if let Some(message) = response.error {
            return Err(ColonyError::Application { agent_id: agent_id.to_string(), message });
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
        let summaries = aggregate_sysmetrics(agent_id, &raw);
        with_conflict_retry(|| {
            let summaries = summaries.clone();
            let store = self.store.clone();
            async move {
                let mut tx = store.begin_tx().await?;
                system_metrics_store::batch_upsert(&mut tx, &summaries).await?;
                tx.commit().await.map_err(ColonyError::from)
            }
        })
        .await
    }
}

#[async_trait]
impl PollCycle for GapRecoveryService {
    fn name(&self) -> &str {
        "gap_recovery"
    }

    /// One cycle (spec 4.7): pull up to 100 pending gaps, attempt each,
    /// and advance its state machine. A gap whose agent is absent or
    /// unhealthy is skipped without consuming an attempt.
    async fn poll_once(&self) -> anyhow::Result<()> {
        let max_attempts = self.settings.gap_recovery.max_recovery_attempts;
        let gaps = GapStore::pending(self.store.pool(), max_attempts).await?;

        let mut recovered = 0u32;
        let mut permanent = 0u32;

        for gap in gaps {
            let agent = self.registry.get(&gap.agent_id).await?;
            let Some(agent) = agent else {
                continue;
            };
            if crate::registry::determine_status(agent.last_seen, crate::poller::now()) == crate::registry::AgentHealth::Unhealthy {
                continue;
            }

            GapStore::increment_attempt(self.store.pool(), gap.id).await?;

            match self.recover_one(&gap).await {
                Ok(()) => {
                    GapStore::mark_recovered(self.store.pool(), gap.id).await?;
                    recovered += 1;
                    info!(gap_id = gap.id, agent_id = %gap.agent_id, data_type = %gap.data_type, "gap recovered");
                }
                Err(err) => {
                    let attempts = gap.recovery_attempts + 1;
                    if attempts >= max_attempts {
                        GapStore::mark_permanent(self.store.pool(), gap.id).await?;
                        permanent += 1;
                        let lost = gap.end_seq_id - gap.start_seq_id + 1;
                        warn!(
                            gap_id = gap.id,
                            agent_id = %gap.agent_id,
                            data_type = %gap.data_type,
                            start = gap.start_seq_id,
                            end = gap.end_seq_id,
                            records_lost = lost,
                            "permanent data loss: gap exhausted recovery attempts"
                        );
                    } else {
                        warn!(gap_id = gap.id, agent_id = %gap.agent_id, error = %err, attempts, "gap recovery attempt failed, will retry next cycle");
                    }
                }
            }
        }

        info!(recovered, permanent, "gap recovery cycle complete");
        Ok(())
    }

    async fn cleanup_once(&self) -> anyhow::Result<()> {
        let retention = chrono::Duration::days(self.settings.gap_recovery.gap_retention_days as i64);
        let deleted = GapStore::cleanup(self.store.pool(), retention).await?;
        if deleted > 0 {
            info!(deleted, "pruned terminal gap ledger rows past retention");
        }
        Ok(())
    }
}
