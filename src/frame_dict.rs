//! Frame dictionary (spec 4.2): a process-wide `frame_name -> frame_id`
//! mapping that lets profile summaries store a `BIGINT[]` of ids instead
//! of repeating stack strings, for the ~85% compression spec 9 describes.
//!
//! Cache shape is grounded on the teacher's `DashMap` block cache in
//! `indexer/block_processor.rs`: a sharded concurrent map gives us the
//! per-name critical section spec 4.2 asks for (encode takes the "write
//! lock" for one name's resolve+insert+select; decode only reads) without
//! a single coarse `RwLock` serializing unrelated names.

use dashmap::DashMap;
use sqlx::PgPool;

use crate::error::{ColonyError, ColonyResult};

pub struct FrameDictionary {
    pool: PgPool,
    by_name: DashMap<String, i64>,
    by_id: DashMap<i64, String>,
}

impl FrameDictionary {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, by_name: DashMap::new(), by_id: DashMap::new() }
    }

    /// Looks up or assigns an id for each name, preserving input order and
    /// mapping duplicates to the same id.
    pub async fn encode(&self, frame_names: &[String]) -> ColonyResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(frame_names.len());
        for name in frame_names {
            ids.push(self.encode_one(name).await?);
        }
        Ok(ids)
    }

    async fn encode_one(&self, name: &str) -> ColonyResult<i64> {
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }

        if let Some(row) =
            sqlx::query_as::<_, (i64,)>("SELECT frame_id FROM profile_frame_dictionary WHERE frame_name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(ColonyError::from)?
        {
            self.cache(name.to_string(), row.0);
            return Ok(row.0);
        }

        sqlx::query(
            "INSERT INTO profile_frame_dictionary (frame_name) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(ColonyError::from)?;

        // Either our insert won, or a concurrent writer's did; either way
        // the row now exists under this name.
        let (id,): (i64,) =
            sqlx::query_as("SELECT frame_id FROM profile_frame_dictionary WHERE frame_name = $1")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(ColonyError::from)?;

        self.cache(name.to_string(), id);
        Ok(id)
    }

    fn cache(&self, name: String, id: i64) {
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
    }

    /// Resolves ids to names, consulting the cache first and issuing one
    /// batched SELECT for whatever remains. Unresolved ids fall back to
    /// the synthetic `unknown_frame_<id>` token (spec 3's referential
    /// integrity invariant).
    pub async fn decode(&self, frame_ids: &[i64]) -> ColonyResult<Vec<String>> {
        let mut resolved: Vec<Option<String>> = Vec::with_capacity(frame_ids.len());
        let mut misses: Vec<i64> = Vec::new();

        for id in frame_ids {
            match self.by_id.get(id) {
                Some(name) => resolved.push(Some(name.clone())),
                None => {
                    resolved.push(None);
                    misses.push(*id);
                }
            }
        }

        if !misses.is_empty() {
            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT frame_id, frame_name FROM profile_frame_dictionary WHERE frame_id = ANY($1)",
            )
            .bind(&misses)
            .fetch_all(&self.pool)
            .await
            .map_err(ColonyError::from)?;

            for (id, name) in &rows {
                self.cache(name.clone(), *id);
            }

            let mut by_id = std::collections::HashMap::new();
            for (id, name) in rows {
                by_id.insert(id, name);
            }

            for (slot, id) in resolved.iter_mut().zip(frame_ids.iter()) {
                if slot.is_none() {
                    *slot = Some(
                        by_id
                            .get(id)
                            .cloned()
                            .unwrap_or_else(|| format!("unknown_frame_{id}")),
                    );
                }
            }
        }

        Ok(resolved.into_iter().map(|s| s.unwrap_or_default()).collect())
    }

    /// Deletes dictionary rows unreferenced by either profile-summary
    /// table and drops them from the local cache.
    pub async fn sweep(&self) -> ColonyResult<u64> {
        let result = sqlx::query(
            "DELETE FROM profile_frame_dictionary WHERE frame_id NOT IN ( \
                SELECT DISTINCT unnest(stack_frame_ids) FROM cpu_profile_summaries \
                UNION \
                SELECT DISTINCT unnest(stack_frame_ids) FROM memory_profile_summaries \
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(ColonyError::from)?;

        // Cache entries for swept ids are stale; cheapest correct fix is
        // dropping the whole cache rather than tracking which ids were hit.
        self.by_name.clear();
        self.by_id.clear();

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_frame_fallback_format() {
        let fallback = format!("unknown_frame_{}", 42);
        assert_eq!(fallback, "unknown_frame_42");
    }
}
