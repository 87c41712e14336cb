use thiserror::Error;

/// Stable error taxonomy for the pull/aggregate/store pipeline (spec 7).
///
/// Pollers and the gap recovery service branch on these variants directly;
/// anything that doesn't need branching (config loading, CLI wiring) stays
/// on `anyhow::Result` instead.
#[derive(Debug, Error)]
pub enum ColonyError {
    /// Agent unreachable or the per-call deadline elapsed.
    #[error("transport error talking to agent {agent_id}: {source}")]
    Transport {
        agent_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The agent answered but set its response's `error` field.
    #[error("agent {agent_id} reported an application error: {message}")]
    Application { agent_id: String, message: String },

    /// A transaction conflict the caller should retry with backoff.
    #[error("storage conflict: {0}")]
    StorageConflict(#[source] sqlx::Error),

    /// Any other storage failure; not retriable within the same cycle.
    #[error("storage failure: {0}")]
    StorageFailure(#[source] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for ColonyError {
    fn from(err: sqlx::Error) -> Self {
        match classify_sqlx_error(&err) {
            ErrorClass::Conflict => ColonyError::StorageConflict(err),
            ErrorClass::Failure => ColonyError::StorageFailure(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Conflict,
    Failure,
}

/// Classifies a `sqlx::Error` as retriable (`Conflict`) or not (`Failure`).
///
/// Supersedes the source's substring matching on error text (spec 9's note)
/// with SQLSTATE codes: `40001` (serialization_failure), `40P01`
/// (deadlock_detected), and `23505` (unique_violation, which can surface on
/// an upsert race before the ON CONFLICT arbiter resolves it).
pub fn classify_sqlx_error(err: &sqlx::Error) -> ErrorClass {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            match code.as_ref() {
                "40001" | "40P01" | "23505" => return ErrorClass::Conflict,
                _ => {}
            }
        }
        let message = db_err.message().to_lowercase();
        if message.contains("conflict on update")
            || message.contains("conflict")
            || message.contains("serialization")
        {
            return ErrorClass::Conflict;
        }
    }
    ErrorClass::Failure
}

pub type ColonyResult<T> = Result<T, ColonyError>;
