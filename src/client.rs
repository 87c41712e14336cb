//! Agent RPC surface consumed by the typed pollers (spec 6.2). The wire
//! transport is out of scope (any framed RPC carrying these messages is
//! acceptable); this module only fixes the request/response shapes and
//! the trait pollers call through, the same way the teacher's
//! `arch_rpc::ArchRpcClient` fixes the node JSON-RPC surface it consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Common request shape for every per-data-type RPC: `start_seq_id` is an
/// exclusive lower bound, so a poller resumes with its checkpoint's
/// `last_seq_id` directly.
#[derive(Debug, Clone, Serialize)]
pub struct PollRequest {
    pub start_seq_id: u64,
    pub max_records: u32,
}

/// Common response envelope. `error` carries an application-level error
/// message (spec 7's Application error variant) distinct from a transport
/// failure, which surfaces as `Err` from the call itself.
#[derive(Debug, Clone, Deserialize)]
pub struct PollResponse<T> {
    pub session_id: String,
    pub max_seq_id: u64,
    pub error: Option<String>,
    pub records: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpMetricRecord {
    pub seq_id: u64,
    pub timestamp_ms: i64,
    pub service_name: String,
    pub http_method: String,
    pub http_route: String,
    pub http_status_code: i32,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GrpcMetricRecord {
    pub seq_id: u64,
    pub timestamp_ms: i64,
    pub service_name: String,
    pub grpc_method: String,
    pub grpc_status_code: i32,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqlMetricRecord {
    pub seq_id: u64,
    pub timestamp_ms: i64,
    pub service_name: String,
    pub sql_operation: String,
    pub table_name: String,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceSpanRecord {
    pub seq_id: u64,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service_name: String,
    pub span_name: String,
    pub span_kind: String,
    pub start_time_ms: i64,
    pub duration_us: i64,
    pub status_code: String,
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CpuProfileRecord {
    pub seq_id: u64,
    pub timestamp: i64,
    pub service_name: String,
    pub build_id: String,
    /// Leaf-to-root order, as spec 6.2 states; aggregation reverses this
    /// only where display needs root-to-leaf.
    pub stack_frames: Vec<String>,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryProfileRecord {
    pub seq_id: u64,
    pub timestamp: i64,
    pub service_name: String,
    pub build_id: String,
    pub stack_frames: Vec<String>,
    pub alloc_bytes: u64,
    pub alloc_objects: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMetricRecord {
    pub seq_id: u64,
    pub timestamp_ms: i64,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub metric_type: String,
    pub attributes_json: String,
}

/// One RPC per data type (spec 6.2); implemented over whatever wire
/// transport the agent speaks. Pollers depend only on this trait, and
/// address agents by `(agent_id, endpoint)` the way the registry hands
/// them out (`registry::Agent`).
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn poll_http_metrics(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<HttpMetricRecord>>;

    async fn poll_grpc_metrics(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<GrpcMetricRecord>>;

    async fn poll_sql_metrics(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<SqlMetricRecord>>;

    async fn poll_traces(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<TraceSpanRecord>>;

    async fn poll_cpu_profiles(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<CpuProfileRecord>>;

    async fn poll_memory_profiles(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<MemoryProfileRecord>>;

    async fn poll_system_metrics(
        &self,
        agent_id: &str,
        endpoint: &str,
        req: PollRequest,
    ) -> anyhow::Result<PollResponse<SystemMetricRecord>>;
}

/// `reqwest`-backed implementation talking newline-delimited JSON POSTs to
/// `{endpoint}/poll/{data_type}`, the simplest framing that satisfies
/// spec 6.2's "any framed RPC" allowance.
pub struct HttpAgentClient {
    http: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        Self { http }
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        agent_id: &str,
        endpoint: &str,
        path: &str,
        body: &T,
    ) -> anyhow::Result<R> {
        let url = format!("{endpoint}/poll/{path}");
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("agent {agent_id} unreachable at {url}: {e}"))?;
        let resp = resp.error_for_status().map_err(|e| anyhow::anyhow!("agent {agent_id} returned error status: {e}"))?;
        resp.json::<R>()
            .await
            .map_err(|e| anyhow::anyhow!("agent {agent_id} sent an unparsable response: {e}"))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn poll_http_metrics(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<HttpMetricRecord>> {
        self.post(agent_id, endpoint, "http-metrics", &req).await
    }

    async fn poll_grpc_metrics(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<GrpcMetricRecord>> {
        self.post(agent_id, endpoint, "grpc-metrics", &req).await
    }

    async fn poll_sql_metrics(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<SqlMetricRecord>> {
        self.post(agent_id, endpoint, "sql-metrics", &req).await
    }

    async fn poll_traces(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<TraceSpanRecord>> {
        self.post(agent_id, endpoint, "traces", &req).await
    }

    async fn poll_cpu_profiles(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<CpuProfileRecord>> {
        self.post(agent_id, endpoint, "cpu-profiles", &req).await
    }

    async fn poll_memory_profiles(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<MemoryProfileRecord>> {
        self.post(agent_id, endpoint, "memory-profiles", &req).await
    }

    async fn poll_system_metrics(&self, agent_id: &str, endpoint: &str, req: PollRequest) -> anyhow::Result<PollResponse<SystemMetricRecord>> {
        self.post(agent_id, endpoint, "system-metrics", &req).await
    }
}
