//! Retry policy for provider calls.
//!
//! One retry after a fixed delay, and only for transient failures
//! (timeout / 5xx / connect). 4xx and 429 never retry.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::provider::ProviderError;

pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Run `op`, retrying exactly once after [`RETRY_DELAY`] when the first
/// attempt fails with a transient error.
pub async fn with_retry<T, F, Fut>(label: &str, op: F) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!(call = label, error = %e, "transient provider failure, retrying once");
            tokio::time::sleep(RETRY_DELAY).await;
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn transient_error_is_retried_once() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::Timeout { ms: 30_000 })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Api {
                    status: 400,
                    message: "bad request".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_surfaces() {
        let result: Result<(), _> =
            with_retry("test", || async { Err(ProviderError::Timeout { ms: 1 }) }).await;
        match result {
            Err(ProviderError::Timeout { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
