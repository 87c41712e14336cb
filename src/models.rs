//! Plain row structs for the core entities of spec 3 / 6.3, mapped with
//! `sqlx::FromRow` the way the teacher's `db/models.rs` maps `Block` and
//! `Transaction`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub app_id: Option<String>,
    pub version: Option<String>,
    pub agent_id: String,
    pub labels: JsonValue,
    pub status: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Active,
    Degraded,
    Inactive,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Degraded => "degraded",
            ServiceStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceHeartbeat {
    pub service_id: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceConnection {
    pub from_service: String,
    pub to_service: String,
    pub protocol: String,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    pub connection_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentIpAllocation {
    pub agent_id: String,
    pub ip_address: String,
    pub allocated_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HttpMetricSummary {
    pub timestamp_bucket: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub http_method: String,
    pub http_route: String,
    pub http_status_code: i32,
    pub latency_bucket_ms: f64,
    pub count: i64,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GrpcMetricSummary {
    pub timestamp_bucket: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub grpc_method: String,
    pub grpc_status_code: i32,
    pub latency_bucket_ms: f64,
    pub count: i64,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SqlMetricSummary {
    pub timestamp_bucket: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub sql_operation: String,
    pub table_name: String,
    pub latency_bucket_ms: f64,
    pub count: i64,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TraceSpan {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub agent_id: String,
    pub service_name: String,
    pub span_name: String,
    pub span_kind: String,
    pub start_time: DateTime<Utc>,
    pub duration_us: i64,
    pub status_code: String,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OtelSummary {
    pub bucket_time: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub span_kind: String,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_count: i64,
    pub total_spans: i64,
    pub sample_traces: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CpuProfileSummary {
    pub bucket_time: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub build_id: String,
    pub stack_hash: String,
    pub stack_frame_ids: Vec<i64>,
    pub sample_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemoryProfileSummary {
    pub bucket_time: DateTime<Utc>,
    pub agent_id: String,
    pub service_name: String,
    pub build_id: String,
    pub stack_hash: String,
    pub stack_frame_ids: Vec<i64>,
    pub alloc_bytes: i64,
    pub alloc_objects: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BinaryMetadata {
    pub build_id: String,
    pub service_name: String,
    pub binary_path: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub has_debug_info: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemMetricSummary {
    pub bucket_time: DateTime<Utc>,
    pub agent_id: String,
    pub metric_name: String,
    pub attributes_json: String,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
    pub p95_value: f64,
    pub delta_value: f64,
    pub sample_count: i64,
    pub unit: String,
    pub metric_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapStatus {
    Detected,
    Recovering,
    Recovered,
    Permanent,
}

impl GapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapStatus::Detected => "detected",
            GapStatus::Recovering => "recovering",
            GapStatus::Recovered => "recovered",
            GapStatus::Permanent => "permanent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(GapStatus::Detected),
            "recovering" => Some(GapStatus::Recovering),
            "recovered" => Some(GapStatus::Recovered),
            "permanent" => Some(GapStatus::Permanent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceGap {
    pub id: i64,
    pub agent_id: String,
    pub data_type: String,
    pub start_seq_id: i64,
    pub end_seq_id: i64,
    pub detected_at: DateTime<Utc>,
    pub recovered_at: Option<DateTime<Utc>>,
    pub status: String,
    pub recovery_attempts: i32,
    pub last_recovery_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PollingCheckpoint {
    pub agent_id: String,
    pub data_type: String,
    pub session_id: String,
    pub last_seq_id: i64,
    pub last_poll_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
