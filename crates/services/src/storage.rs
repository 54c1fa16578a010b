//! Bounded access to the storage collaborator.
//!
//! Every repository call made by a service goes through [`StoragePolicy`]:
//! calls are cut off after `timeout` and surface as `StorageUnavailable`.
//! Idempotent reads get exactly one retry; writes get none.

use std::future::Future;
use std::time::Duration;

use domains::{DomainError, DomainResult};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePolicy {
    pub timeout: Duration,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(2000) }
    }
}

impl StoragePolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Runs one storage call under the timeout.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Err(DomainError::StorageUnavailable(reason))) => {
                error!(op, %reason, "storage call failed");
                Err(DomainError::StorageUnavailable(reason))
            }
            Ok(result) => result,
            Err(_) => {
                error!(op, timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(DomainError::StorageUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// Like [`call`](Self::call), retrying once on a transient failure.
    /// Only for operations that are safe to repeat.
    pub async fn read<T, F, Fut>(&self, op: &'static str, mut make: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        match self.call(op, make()).await {
            Err(err) if err.is_transient() => {
                warn!(op, "retrying storage read once");
                self.call(op, make()).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn slow_calls_time_out() {
        let policy = StoragePolicy::with_timeout(Duration::from_millis(10));
        let result: DomainResult<()> = policy
            .call("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DomainError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn reads_retry_exactly_once() {
        let policy = StoragePolicy::default();
        let attempts = AtomicUsize::new(0);

        let result: DomainResult<u32> = policy
            .read("flaky", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(DomainError::StorageUnavailable("blip".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        attempts.store(0, Ordering::SeqCst);
        let result: DomainResult<u32> = policy
            .read("down", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(DomainError::StorageUnavailable("down".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let policy = StoragePolicy::default();
        let attempts = AtomicUsize::new(0);
        let result: DomainResult<()> = policy
            .read("missing", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(DomainError::not_found("tag", "x")) }
            })
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
