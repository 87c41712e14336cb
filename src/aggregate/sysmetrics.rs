//! System metric aggregator (spec 4.3): groups by
//! `(bucket, agent, metric_name, attributes_json)` and computes
//! min/max/avg/p95 plus a counter/delta-style `delta = max - min`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::percentile::p95;
use super::{clamp_u64_to_i64, floor_to_minute, from_millis};
use crate::models::SystemMetricSummary;

#[derive(Debug, Clone)]
pub struct RawSystemMetric {
    pub timestamp_ms: i64,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub metric_type: String,
    pub attributes_json: String,
}

pub fn aggregate(agent_id: &str, metrics: &[RawSystemMetric]) -> Vec<SystemMetricSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        metric_name: String,
        attributes_json: String,
    }

    struct Group {
        values: Vec<f64>,
        unit: String,
        metric_type: String,
    }

    let mut groups: HashMap<Key, Group> = HashMap::new();

    for metric in metrics {
        let bucket = floor_to_minute(from_millis(metric.timestamp_ms));
        let key = Key {
            bucket,
            metric_name: metric.name.clone(),
            attributes_json: metric.attributes_json.clone(),
        };
        let group = groups.entry(key).or_insert_with(|| Group {
            values: Vec::new(),
            unit: metric.unit.clone(),
            metric_type: metric.metric_type.clone(),
        });
        group.values.push(metric.value);
    }

    groups
        .into_iter()
        .map(|(key, group)| {
            let min = group.values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = group.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = group.values.iter().sum();
            let avg = sum / group.values.len() as f64;
            SystemMetricSummary {
                bucket_time: key.bucket,
                agent_id: agent_id.to_string(),
                metric_name: key.metric_name,
                attributes_json: key.attributes_json,
                min_value: min,
                max_value: max,
                avg_value: avg,
                p95_value: p95(&group.values),
                delta_value: max - min,
                sample_count: clamp_u64_to_i64(group.values.len() as u64),
                unit: group.unit,
                metric_type: group.metric_type,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_name_and_attributes_and_computes_stats() {
        let metrics = vec![
            RawSystemMetric {
                timestamp_ms: 0,
                name: "cpu.usage".to_string(),
                value: 10.0,
                unit: "percent".to_string(),
                metric_type: "gauge".to_string(),
                attributes_json: "{\"core\":\"0\"}".to_string(),
            },
            RawSystemMetric {
                timestamp_ms: 0,
                name: "cpu.usage".to_string(),
                value: 20.0,
                unit: "percent".to_string(),
                metric_type: "gauge".to_string(),
                attributes_json: "{\"core\":\"0\"}".to_string(),
            },
        ];
        let rows = aggregate("agent-1", &metrics);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].min_value, 10.0);
        assert_eq!(rows[0].max_value, 20.0);
        assert_eq!(rows[0].avg_value, 15.0);
        assert_eq!(rows[0].delta_value, 10.0);
        assert_eq!(rows[0].sample_count, 2);
    }

    #[test]
    fn distinct_attributes_json_do_not_merge() {
        let metrics = vec![
            RawSystemMetric {
                timestamp_ms: 0,
                name: "cpu.usage".to_string(),
                value: 10.0,
                unit: "percent".to_string(),
                metric_type: "gauge".to_string(),
                attributes_json: "{\"core\":\"0\"}".to_string(),
            },
            RawSystemMetric {
                timestamp_ms: 0,
                name: "cpu.usage".to_string(),
                value: 90.0,
                unit: "percent".to_string(),
                metric_type: "gauge".to_string(),
                attributes_json: "{\"core\":\"1\"}".to_string(),
            },
        ];
        assert_eq!(aggregate("agent-1", &metrics).len(), 2);
    }
}
