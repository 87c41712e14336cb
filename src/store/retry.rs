//! Bounded jittered-backoff retry for storage conflicts (spec 5, 9),
//! grounded on the `tokio_retry` + `ExponentialBackoff::from_millis(10)`
//! idiom already used in the teacher's `indexer/sync.rs`.

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::error::ColonyError;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_RETRIES: usize = 10;

/// Retries `op` while it fails with a [`ColonyError::StorageConflict`], up
/// to 10 attempts with jittered exponential backoff capped at 500ms. Any
/// other error (or conflict exhaustion) is returned immediately.
pub async fn with_conflict_retry<F, Fut, T>(op: F) -> Result<T, ColonyError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ColonyError>>,
{
    let strategy = ExponentialBackoff::from_millis(INITIAL_BACKOFF_MS)
        .max_delay(std::time::Duration::from_millis(500))
        .map(jitter)
        .take(MAX_RETRIES);

    let mut attempts = strategy;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retriable = matches!(err, ColonyError::StorageConflict(_));
                if !retriable {
                    return Err(err);
                }
                match attempts.next() {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(err),
                }
            }
        }
    }
}

/// Used by call sites that want to assert a class before retrying, e.g. the
/// gap recovery service distinguishing conflict from permanent failure.
pub fn is_retriable(err: &ColonyError) -> bool {
    matches!(err, ColonyError::StorageConflict(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_on_conflict_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let result = with_conflict_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ColonyError::StorageConflict(sqlx::Error::RowNotFound))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_conflict_errors() {
        let attempts = AtomicUsize::new(0);
        let result: Result<i32, ColonyError> = with_conflict_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(ColonyError::StorageFailure(sqlx::Error::RowNotFound)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
