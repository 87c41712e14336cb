//! Typed pollers (spec 4.5-4.8): one [`base::PollCycle`] per agent data
//! type, each wired to [`crate::client::AgentClient`], the relevant
//! [`crate::aggregate`] function, and a [`crate::store`] upsert.

pub mod base;
pub mod gap_detect;
pub mod otel;
pub mod profiles;
pub mod red;
pub mod sysmetrics;
pub mod traces;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::checkpoint::gap::{GapRange, GapStore};
use crate::error::ColonyResult;

/// The sequence id a poll's request should resume from: the checkpoint's
/// `last_seq_id`, or 0 if there isn't one yet. Does not touch session
/// state - that's only resolvable once the response comes back.
pub async fn resume_point(pool: &PgPool, agent_id: &str, data_type: &str) -> ColonyResult<u64> {
    Ok(CheckpointStore::get(pool, agent_id, data_type)
        .await?
        .map(|c| c.last_seq_id as u64)
        .unwrap_or(0))
}

/// Reconciles the checkpoint's stored session against the one the agent
/// just reported (spec 3: "a new `session_id` resets the sequence").
/// Returns the sequence id gap detection should treat as the floor
/// together with whether the session just changed.
///
/// A session change means the response the caller already has in hand was
/// fetched with the *old* session's cursor as `start_seq_id` and must be
/// discarded: the caller has to re-issue the poll RPC with `start_seq_id =
/// 0` and process that fresh response instead (spec 4.6.1.c, §3's
/// session-reset rule). A brand new checkpoint (`None`) is not a session
/// change - the floor was already 0 going into the original request.
pub async fn reconcile_session(
    pool: &PgPool,
    agent_id: &str,
    data_type: &str,
    response_session_id: &str,
) -> ColonyResult<(u64, bool)> {
    match CheckpointStore::get(pool, agent_id, data_type).await? {
        Some(checkpoint) if checkpoint.session_id == response_session_id => {
            Ok((checkpoint.last_seq_id as u64, false))
        }
        Some(_) => {
            info!(agent_id, data_type, "agent session changed, resetting checkpoint");
            CheckpointStore::reset(pool, agent_id, data_type).await?;
            Ok((0, true))
        }
        None => Ok((0, false)),
    }
}

/// Records every gap `detect_gaps` found into the gap ledger (spec 4.4,
/// 4.6 step 1d). Recording happens outside the summary-commit transaction:
/// a gap row surviving a later crash just gets recorded again, which is
/// harmless (idempotent by content, not by row).
pub async fn record_gaps(pool: &PgPool, agent_id: &str, data_type: &str, gaps: &[GapRange]) {
    for gap in gaps {
        if let Err(err) = GapStore::record(pool, agent_id, data_type, gap.start as i64, gap.end as i64).await {
            tracing::error!(agent_id, data_type, error = %err, "failed to record detected gap");
        }
    }
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
