//! CPU/memory profile aggregators (spec 4.3). Stack frame names are
//! resolved to ids by the caller (through [`crate::frame_dict::FrameDictionary`])
//! before these pure functions run, so stack hashing only ever sees
//! integers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::{clamp_u64_to_i64, floor_to_minute, from_millis};
use crate::models::{CpuProfileSummary, MemoryProfileSummary};

#[derive(Debug, Clone)]
pub struct RawCpuSample {
    pub timestamp_ms: i64,
    pub service_name: String,
    pub build_id: String,
    /// Leaf-to-root frame ids, already resolved through the frame dictionary.
    pub frame_ids: Vec<i64>,
    pub sample_count: u64,
}

#[derive(Debug, Clone)]
pub struct RawMemorySample {
    pub timestamp_ms: i64,
    pub service_name: String,
    pub build_id: String,
    pub frame_ids: Vec<i64>,
    pub alloc_bytes: u64,
    pub alloc_objects: u64,
}

/// `SHA-256(LE64(frame_ids...))`, hex-encoded, used as the stack
/// deduplication key (spec 3, glossary).
pub fn stack_hash(frame_ids: &[i64]) -> String {
    let mut hasher = Sha256::new();
    for id in frame_ids {
        hasher.update(id.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn aggregate_cpu(agent_id: &str, samples: &[RawCpuSample]) -> Vec<CpuProfileSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        build_id: String,
        stack_hash: String,
    }

    struct Group {
        service_name: String,
        frame_ids: Vec<i64>,
        sample_count: u64,
    }

    let mut groups: HashMap<Key, Group> = HashMap::new();
    // first-appearance order, for "first sample's service_name wins" (spec 9)
    let mut order: Vec<Key> = Vec::new();

    for sample in samples {
        let bucket = floor_to_minute(from_millis(sample.timestamp_ms));
        let hash = stack_hash(&sample.frame_ids);
        let key = Key { bucket, build_id: sample.build_id.clone(), stack_hash: hash };

        match groups.get_mut(&key) {
            Some(group) => group.sample_count += sample.sample_count,
            None => {
                order.push(key.clone());
                groups.insert(
                    key,
                    Group {
                        service_name: sample.service_name.clone(),
                        frame_ids: sample.frame_ids.clone(),
                        sample_count: sample.sample_count,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let group = groups.remove(&key).expect("key pushed alongside group insert");
            CpuProfileSummary {
                bucket_time: key.bucket,
                agent_id: agent_id.to_string(),
                service_name: group.service_name,
                build_id: key.build_id,
                stack_hash: key.stack_hash,
                stack_frame_ids: group.frame_ids,
                sample_count: clamp_u64_to_i64(group.sample_count),
            }
        })
        .collect()
}

pub fn aggregate_memory(agent_id: &str, samples: &[RawMemorySample]) -> Vec<MemoryProfileSummary> {
    #[derive(Hash, Eq, PartialEq, Clone)]
    struct Key {
        bucket: DateTime<Utc>,
        build_id: String,
        stack_hash: String,
    }

    struct Group {
        service_name: String,
        frame_ids: Vec<i64>,
        alloc_bytes: u64,
        alloc_objects: u64,
    }

    let mut groups: HashMap<Key, Group> = HashMap::new();
    let mut order: Vec<Key> = Vec::new();

    for sample in samples {
        let bucket = floor_to_minute(from_millis(sample.timestamp_ms));
        let hash = stack_hash(&sample.frame_ids);
        let key = Key { bucket, build_id: sample.build_id.clone(), stack_hash: hash };

        match groups.get_mut(&key) {
            Some(group) => {
                group.alloc_bytes += sample.alloc_bytes;
                group.alloc_objects += sample.alloc_objects;
            }
            None => {
                order.push(key.clone());
                groups.insert(
                    key,
                    Group {
                        service_name: sample.service_name.clone(),
                        frame_ids: sample.frame_ids.clone(),
                        alloc_bytes: sample.alloc_bytes,
                        alloc_objects: sample.alloc_objects,
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let group = groups.remove(&key).expect("key pushed alongside group insert");
            MemoryProfileSummary {
                bucket_time: key.bucket,
                agent_id: agent_id.to_string(),
                service_name: group.service_name,
                build_id: key.build_id,
                stack_hash: key.stack_hash,
                stack_frame_ids: group.frame_ids,
                alloc_bytes: clamp_u64_to_i64(group.alloc_bytes),
                alloc_objects: clamp_u64_to_i64(group.alloc_objects),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seed scenario S5: 4 samples in the same minute, same build_id, same
    /// stack, counts 1, 2, 3, 4 - expect one row with sample_count=10.
    #[test]
    fn s5_cpu_aggregation_sums_same_stack() {
        let samples: Vec<RawCpuSample> = [1u64, 2, 3, 4]
            .into_iter()
            .map(|count| RawCpuSample {
                timestamp_ms: 1735689600000,
                service_name: "checkout".to_string(),
                build_id: "build-abc".to_string(),
                frame_ids: vec![10, 11, 12],
                sample_count: count,
            })
            .collect();

        let rows = aggregate_cpu("agent-1", &samples);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sample_count, 10);
        assert_eq!(rows[0].stack_hash, stack_hash(&[10, 11, 12]));
    }

    #[test]
    fn distinct_stacks_produce_distinct_rows() {
        let samples = vec![
            RawCpuSample {
                timestamp_ms: 0,
                service_name: "svc".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![1, 2],
                sample_count: 1,
            },
            RawCpuSample {
                timestamp_ms: 0,
                service_name: "svc".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![3, 4],
                sample_count: 1,
            },
        ];
        assert_eq!(aggregate_cpu("agent-1", &samples).len(), 2);
    }

    #[test]
    fn first_sample_service_name_wins_on_divergence() {
        let samples = vec![
            RawCpuSample {
                timestamp_ms: 0,
                service_name: "first".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![1],
                sample_count: 1,
            },
            RawCpuSample {
                timestamp_ms: 0,
                service_name: "second".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![1],
                sample_count: 1,
            },
        ];
        let rows = aggregate_cpu("agent-1", &samples);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].service_name, "first");
    }

    #[test]
    fn memory_aggregation_sums_bytes_and_objects() {
        let samples = vec![
            RawMemorySample {
                timestamp_ms: 0,
                service_name: "svc".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![1, 2],
                alloc_bytes: 1024,
                alloc_objects: 4,
            },
            RawMemorySample {
                timestamp_ms: 0,
                service_name: "svc".to_string(),
                build_id: "b".to_string(),
                frame_ids: vec![1, 2],
                alloc_bytes: 2048,
                alloc_objects: 8,
            },
        ];
        let rows = aggregate_memory("agent-1", &samples);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alloc_bytes, 3072);
        assert_eq!(rows[0].alloc_objects, 12);
    }
}
