//! Bounded retry combinator for optimistic-concurrency conflicts.

use std::future::Future;

use crate::error::EngineError;

/// Runs `op` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` stale-token conflicts have been observed.
///
/// The operation receives the 1-based attempt number and must perform its own
/// fresh reads on every attempt; a capacity check or token taken from an
/// earlier attempt must never be reused. Only
/// `StorageError::VersionConflict` (through `EngineError::Storage`) retries;
/// every other error returns immediately. After the bound the caller gets
/// `EngineError::ConcurrencyExhausted`, a terminal outcome.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, EngineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable_conflict() => {
                if attempt >= max_attempts {
                    return Err(EngineError::concurrency_exhausted(max_attempts));
                }
                tracing::debug!(attempt, "stale concurrency token, retrying from a fresh read");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stockroom_storage::StorageError;

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, EngineError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let result = retry_on_conflict(3, |attempt| async move {
            if attempt < 3 {
                Err(EngineError::Storage(StorageError::version_conflict(1, 2)))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn exhausts_after_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Storage(StorageError::version_conflict(1, 2))) }
        })
        .await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::ConcurrencyExhausted { attempts: 3 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_conflict_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::capacity_exceeded("Software#ide", 5)) }
        })
        .await;
        assert!(result.unwrap_err().is_capacity_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let result = retry_on_conflict(0, |attempt| async move { Ok::<_, EngineError>(attempt) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
