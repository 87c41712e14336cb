//! OTEL span aggregator (spec 4.3): groups by `(bucket, agent, service,
//! span_kind)`, computes p50/p95/p99 over observed durations, counts
//! errors and total spans, and retains up to `MAX_SAMPLE_TRACES` trace
//! ids per bucket.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::percentile::{p50, p95, p99};
use super::{clamp_u64_to_i64, floor_to_minute, from_millis};
use crate::models::OtelSummary;

const MAX_SAMPLE_TRACES: usize = 10;

#[derive(Debug, Clone)]
pub struct RawSpan {
    pub trace_id: String,
    pub service_name: String,
    pub span_kind: String,
    pub start_time_ms: i64,
    pub duration_us: i64,
    /// `true` when the span's status is anything other than OK.
    pub is_error: bool,
}

pub fn aggregate_spans(agent_id: &str, spans: &[RawSpan]) -> Vec<OtelSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        service: String,
        span_kind: String,
    }

    struct Group {
        durations_ms: Vec<f64>,
        error_count: u64,
        total_spans: u64,
        sample_traces: Vec<String>,
    }

    let mut groups: HashMap<Key, Group> = HashMap::new();

    for span in spans {
        let bucket = floor_to_minute(from_millis(span.start_time_ms));
        let key = Key { bucket, service: span.service_name.clone(), span_kind: span.span_kind.clone() };
        let group = groups.entry(key).or_insert_with(|| Group {
            durations_ms: Vec::new(),
            error_count: 0,
            total_spans: 0,
            sample_traces: Vec::new(),
        });

        group.durations_ms.push(span.duration_us as f64 / 1000.0);
        group.total_spans += 1;
        if span.is_error {
            group.error_count += 1;
        }
        if group.sample_traces.len() < MAX_SAMPLE_TRACES {
            group.sample_traces.push(span.trace_id.clone());
        }
    }

    groups
        .into_iter()
        .map(|(key, group)| OtelSummary {
            bucket_time: key.bucket,
            agent_id: agent_id.to_string(),
            service_name: key.service,
            span_kind: key.span_kind,
            p50_ms: p50(&group.durations_ms),
            p95_ms: p95(&group.durations_ms),
            p99_ms: p99(&group.durations_ms),
            error_count: clamp_u64_to_i64(group.error_count),
            total_spans: clamp_u64_to_i64(group.total_spans),
            sample_traces: group.sample_traces,
            created_at: Utc::now(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seed scenario S6: 10 OTEL span durations [1..10] ms - nearest-rank
    /// convention gives p50=5.
    #[test]
    fn s6_percentiles_use_nearest_rank() {
        let spans: Vec<RawSpan> = (1..=10)
            .map(|ms| RawSpan {
                trace_id: format!("trace-{ms}"),
                service_name: "checkout".to_string(),
                span_kind: "server".to_string(),
                start_time_ms: 0,
                duration_us: ms * 1000,
                is_error: false,
            })
            .collect();

        let rows = aggregate_spans("agent-1", &spans);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].p50_ms, 5.0);
        assert_eq!(rows[0].total_spans, 10);
        assert_eq!(rows[0].error_count, 0);
    }

    #[test]
    fn sample_traces_capped_at_max() {
        let spans: Vec<RawSpan> = (0..25)
            .map(|i| RawSpan {
                trace_id: format!("trace-{i}"),
                service_name: "svc".to_string(),
                span_kind: "server".to_string(),
                start_time_ms: 0,
                duration_us: 1000,
                is_error: false,
            })
            .collect();
        let rows = aggregate_spans("agent-1", &spans);
        assert_eq!(rows[0].sample_traces.len(), MAX_SAMPLE_TRACES);
    }

    #[test]
    fn error_spans_are_counted() {
        let spans = vec![
            RawSpan {
                trace_id: "a".to_string(),
                service_name: "svc".to_string(),
                span_kind: "client".to_string(),
                start_time_ms: 0,
                duration_us: 1000,
                is_error: true,
            },
            RawSpan {
                trace_id: "b".to_string(),
                service_name: "svc".to_string(),
                span_kind: "client".to_string(),
                start_time_ms: 0,
                duration_us: 1000,
                is_error: false,
            },
        ];
        let rows = aggregate_spans("agent-1", &spans);
        assert_eq!(rows[0].error_count, 1);
        assert_eq!(rows[0].total_spans, 2);
    }
}
