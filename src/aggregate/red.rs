//! RED metric aggregators (HTTP/gRPC/SQL): each raw record already carries
//! a fixed latency-bucket boundary set and a parallel count vector from
//! the agent's own histogram; this just re-buckets by minute and emits one
//! summary row per non-zero latency bucket (spec 4.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{clamp_u64_to_i64, floor_to_minute, from_millis};
use crate::models::{GrpcMetricSummary, HttpMetricSummary, SqlMetricSummary};

#[derive(Debug, Clone)]
pub struct RawHttpMetric {
    pub timestamp_ms: i64,
    pub service_name: String,
    pub http_method: String,
    pub http_route: String,
    pub http_status_code: i32,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone)]
pub struct RawGrpcMetric {
    pub timestamp_ms: i64,
    pub service_name: String,
    pub grpc_method: String,
    pub grpc_status_code: i32,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: JsonValue,
}

#[derive(Debug, Clone)]
pub struct RawSqlMetric {
    pub timestamp_ms: i64,
    pub service_name: String,
    pub sql_operation: String,
    pub table_name: String,
    pub latency_buckets: Vec<f64>,
    pub latency_counts: Vec<u64>,
    pub attributes: JsonValue,
}

pub fn aggregate_http(agent_id: &str, records: &[RawHttpMetric]) -> Vec<HttpMetricSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        service: String,
        method: String,
        route: String,
        status: i32,
        latency_bucket_ms: u64, // bit pattern, grouped per exact bucket boundary
    }

    let mut groups: HashMap<Key, (u64, JsonValue)> = HashMap::new();

    for record in records {
        let bucket = floor_to_minute(from_millis(record.timestamp_ms));
        for (latency_ms, count) in record.latency_buckets.iter().zip(record.latency_counts.iter()) {
            if *count == 0 {
                continue;
            }
            let key = Key {
                bucket,
                service: record.service_name.clone(),
                method: record.http_method.clone(),
                route: record.http_route.clone(),
                status: record.http_status_code,
                latency_bucket_ms: latency_ms.to_bits(),
            };
            let entry = groups.entry(key).or_insert((0, record.attributes.clone()));
            entry.0 += count;
        }
    }

    groups
        .into_iter()
        .map(|(key, (count, attributes))| HttpMetricSummary {
            timestamp_bucket: key.bucket,
            agent_id: agent_id.to_string(),
            service_name: key.service,
            http_method: key.method,
            http_route: key.route,
            http_status_code: key.status,
            latency_bucket_ms: f64::from_bits(key.latency_bucket_ms),
            count: clamp_u64_to_i64(count),
            attributes,
        })
        .collect()
}

pub fn aggregate_grpc(agent_id: &str, records: &[RawGrpcMetric]) -> Vec<GrpcMetricSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        service: String,
        method: String,
        status: i32,
        latency_bucket_ms: u64,
    }

    let mut groups: HashMap<Key, (u64, JsonValue)> = HashMap::new();

    for record in records {
        let bucket = floor_to_minute(from_millis(record.timestamp_ms));
        for (latency_ms, count) in record.latency_buckets.iter().zip(record.latency_counts.iter()) {
            if *count == 0 {
                continue;
            }
            let key = Key {
                bucket,
                service: record.service_name.clone(),
                method: record.grpc_method.clone(),
                status: record.grpc_status_code,
                latency_bucket_ms: latency_ms.to_bits(),
            };
            let entry = groups.entry(key).or_insert((0, record.attributes.clone()));
            entry.0 += count;
        }
    }

    groups
        .into_iter()
        .map(|(key, (count, attributes))| GrpcMetricSummary {
            timestamp_bucket: key.bucket,
            agent_id: agent_id.to_string(),
            service_name: key.service,
            grpc_method: key.method,
            grpc_status_code: key.status,
            latency_bucket_ms: f64::from_bits(key.latency_bucket_ms),
            count: clamp_u64_to_i64(count),
            attributes,
        })
        .collect()
}

pub fn aggregate_sql(agent_id: &str, records: &[RawSqlMetric]) -> Vec<SqlMetricSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        service: String,
        operation: String,
        table: String,
        latency_bucket_ms: u64,
    }

    let mut groups: HashMap<Key, (u64, JsonValue)> = HashMap::new();

    for record in records {
        let bucket = floor_to_minute(from_millis(record.timestamp_ms));
        for (latency_ms, count) in record.latency_buckets.iter().zip(record.latency_counts.iter()) {
            if *count == 0 {
                continue;
            }
            let key = Key {
                bucket,
                service: record.service_name.clone(),
                operation: record.sql_operation.clone(),
                table: record.table_name.clone(),
                latency_bucket_ms: latency_ms.to_bits(),
            };
            let entry = groups.entry(key).or_insert((0, record.attributes.clone()));
            entry.0 += count;
        }
    }

    groups
        .into_iter()
        .map(|(key, (count, attributes))| SqlMetricSummary {
            timestamp_bucket: key.bucket,
            agent_id: agent_id.to_string(),
            service_name: key.service,
            sql_operation: key.operation,
            table_name: key.table,
            latency_bucket_ms: f64::from_bits(key.latency_bucket_ms),
            count: clamp_u64_to_i64(count),
            attributes,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Seed scenario S1: one metric at 2025-01-01T00:00:00.000Z, service
    /// payments, method POST, route /api/v1/pay, status 200, buckets
    /// [5, 10, 25, 50], counts [0, 3, 2, 0]. Expect 2 rows with count 3
    /// and 2.
    #[test]
    fn s1_http_red_buckets_into_non_zero_rows() {
        let record = RawHttpMetric {
            timestamp_ms: 1735689600000,
            service_name: "payments".to_string(),
            http_method: "POST".to_string(),
            http_route: "/api/v1/pay".to_string(),
            http_status_code: 200,
            latency_buckets: vec![5.0, 10.0, 25.0, 50.0],
            latency_counts: vec![0, 3, 2, 0],
            attributes: json!({}),
        };

        let rows = aggregate_http("agent-1", &[record]);
        assert_eq!(rows.len(), 2);
        let mut counts: Vec<i64> = rows.iter().map(|r| r.count).collect();
        counts.sort();
        assert_eq!(counts, vec![2, 3]);
    }

    #[test]
    fn zero_count_buckets_emit_no_rows() {
        let record = RawHttpMetric {
            timestamp_ms: 0,
            service_name: "svc".to_string(),
            http_method: "GET".to_string(),
            http_route: "/".to_string(),
            http_status_code: 200,
            latency_buckets: vec![5.0],
            latency_counts: vec![0],
            attributes: json!({}),
        };
        assert!(aggregate_http("agent-1", &[record]).is_empty());
    }

    #[test]
    fn repeated_records_in_same_minute_accumulate() {
        let make = || RawSqlMetric {
            timestamp_ms: 1735689600123,
            service_name: "billing".to_string(),
            sql_operation: "SELECT".to_string(),
            table_name: "invoices".to_string(),
            latency_buckets: vec![10.0],
            latency_counts: vec![4],
            attributes: json!({}),
        };
        let rows = aggregate_sql("agent-1", &[make(), make()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 8);
    }
}
