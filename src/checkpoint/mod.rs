pub mod gap;

use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{ColonyError, ColonyResult};
use crate::models::PollingCheckpoint;

/// Per-`(agent_id, data_type)` polling cursor (spec 4.4). `Update`/`UpdateTx`
/// both exist because the typed poller cycle commits the checkpoint in the
/// same transaction as the summary batch (spec 4.6 step 2, 5's ordering
/// guarantee); `Get`/`Reset`/`ResetAll` run outside any particular cycle's
/// transaction.
pub struct CheckpointStore;

impl CheckpointStore {
    pub async fn get(pool: &PgPool, agent_id: &str, data_type: &str) -> ColonyResult<Option<PollingCheckpoint>> {
        sqlx::query_as::<_, PollingCheckpoint>(
            "SELECT agent_id, data_type, session_id, last_seq_id, last_poll_time, created_at, updated_at \
             FROM polling_checkpoints WHERE agent_id = $1 AND data_type = $2",
        )
        .bind(agent_id)
        .bind(data_type)
        .fetch_optional(pool)
        .await
        .map_err(ColonyError::from)
    }

    pub async fn update(pool: &PgPool, agent_id: &str, data_type: &str, session_id: &str, last_seq_id: i64) -> ColonyResult<()> {
        let mut tx = pool.begin().await.map_err(ColonyError::from)?;
        Self::update_tx(&mut tx, agent_id, data_type, session_id, last_seq_id).await?;
        tx.commit().await.map_err(ColonyError::from)?;
        Ok(())
    }

    /// Same statement as [`Self::update`] but against a caller-owned
    /// transaction, so the summary write and the checkpoint advance commit
    /// atomically (spec 4.6 step 2).
    pub async fn update_tx(
        tx: &mut Transaction<'_, Postgres>,
        agent_id: &str,
        data_type: &str,
        session_id: &str,
        last_seq_id: i64,
    ) -> ColonyResult<()> {
        sqlx::query(
            "INSERT INTO polling_checkpoints (agent_id, data_type, session_id, last_seq_id, last_poll_time, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) \
             ON CONFLICT (agent_id, data_type) DO UPDATE SET \
             session_id = EXCLUDED.session_id, \
             last_seq_id = EXCLUDED.last_seq_id, \
             last_poll_time = now(), \
             updated_at = now()",
        )
        .bind(agent_id)
        .bind(data_type)
        .bind(session_id)
        .bind(last_seq_id)
        .execute(&mut **tx)
        .await
        .map_err(ColonyError::from)?;
        Ok(())
    }

    /// Deletes the checkpoint for one `(agent, data_type)`, used on a
    /// session change (spec 3's reset semantics) or agent removal.
    pub async fn reset(pool: &PgPool, agent_id: &str, data_type: &str) -> ColonyResult<()> {
        sqlx::query("DELETE FROM polling_checkpoints WHERE agent_id = $1 AND data_type = $2")
            .bind(agent_id)
            .bind(data_type)
            .execute(pool)
            .await
            .map_err(ColonyError::from)?;
        Ok(())
    }

    /// Same as [`Self::reset`] but inside the caller's transaction, so the
    /// delete and the subsequent re-query from seq 0 are ordered correctly
    /// relative to other writers.
    pub async fn reset_tx(tx: &mut Transaction<'_, Postgres>, agent_id: &str, data_type: &str) -> ColonyResult<()> {
        sqlx::query("DELETE FROM polling_checkpoints WHERE agent_id = $1 AND data_type = $2")
            .bind(agent_id)
            .bind(data_type)
            .execute(&mut **tx)
            .await
            .map_err(ColonyError::from)?;
        Ok(())
    }

    pub async fn reset_all(pool: &PgPool, agent_id: &str) -> ColonyResult<()> {
        sqlx::query("DELETE FROM polling_checkpoints WHERE agent_id = $1")
            .bind(agent_id)
            .execute(pool)
            .await
            .map_err(ColonyError::from)?;
        Ok(())
    }
}
