//! Gap ledger (spec 4.4, state machine in 4.7).

use sqlx::PgPool;

use crate::error::{ColonyError, ColonyResult};
use crate::models::{GapStatus, SequenceGap};

const PENDING_LIMIT: i64 = 100;

pub struct GapStore;

impl GapStore {
    pub async fn record(pool: &PgPool, agent_id: &str, data_type: &str, start_seq: i64, end_seq: i64) -> ColonyResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO sequence_gaps (agent_id, data_type, start_seq_id, end_seq_id, status, recovery_attempts) \
             VALUES ($1, $2, $3, $4, 'detected', 0) RETURNING id",
        )
        .bind(agent_id)
        .bind(data_type)
        .bind(start_seq)
        .bind(end_seq)
        .fetch_one(pool)
        .await
        .map_err(ColonyError::from)?;
        Ok(id)
    }

    /// Gaps whose status is `detected` or `recovering` and whose attempt
    /// count hasn't exhausted `max_attempts`, oldest first, capped at 100
    /// (spec 4.4).
    pub async fn pending(pool: &PgPool, max_attempts: i32) -> ColonyResult<Vec<SequenceGap>> {
        sqlx::query_as::<_, SequenceGap>(
            "SELECT id, agent_id, data_type, start_seq_id, end_seq_id, detected_at, recovered_at, \
                    status, recovery_attempts, last_recovery_attempt \
             FROM sequence_gaps \
             WHERE status IN ('detected', 'recovering') AND recovery_attempts < $1 \
             ORDER BY detected_at ASC \
             LIMIT $2",
        )
        .bind(max_attempts)
        .bind(PENDING_LIMIT)
        .fetch_all(pool)
        .await
        .map_err(ColonyError::from)
    }

    pub async fn increment_attempt(pool: &PgPool, id: i64) -> ColonyResult<()> {
        sqlx::query(
            "UPDATE sequence_gaps SET status = 'recovering', recovery_attempts = recovery_attempts + 1, \
             last_recovery_attempt = now() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(ColonyError::from)?;
        Ok(())
    }

    pub async fn mark_recovered(pool: &PgPool, id: i64) -> ColonyResult<()> {
        sqlx::query("UPDATE sequence_gaps SET status = 'recovered', recovered_at = now() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(ColonyError::from)?;
        Ok(())
    }

    pub async fn mark_permanent(pool: &PgPool, id: i64) -> ColonyResult<()> {
        sqlx::query("UPDATE sequence_gaps SET status = 'permanent' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(ColonyError::from)?;
        Ok(())
    }

    /// Deletes terminal gaps (`recovered`/`permanent`) older than `retention`.
    pub async fn cleanup(pool: &PgPool, retention: chrono::Duration) -> ColonyResult<u64> {
        let cutoff = chrono::Utc::now() - retention;
        let result = sqlx::query(
            "DELETE FROM sequence_gaps WHERE status IN ('recovered', 'permanent') AND detected_at < $1",
        )
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(ColonyError::from)?;
        Ok(result.rows_affected())
    }
}

/// One maximal contiguous missing range of sequence ids, as produced by
/// [`crate::poller::gap_detect::detect_gaps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRange {
    pub start: u64,
    pub end: u64,
}

pub fn status_of(gap: &SequenceGap) -> Option<GapStatus> {
    GapStatus::from_str(&gap.status)
}
