//! Timeout guard (spec §4.10).
//!
//! A thin wrapper over `tokio::time::timeout`: on expiry the original future
//! is dropped (Tokio cancels it at the next await point) and the fallback
//! wins even if `op` would have eventually completed. Timeouts are never
//! escalated to the caller as an error.

use std::future::Future;
use std::time::Duration;

/// Run `op` with a deadline of `timeout_ms`. Returns `op`'s output, or
/// `fallback()` if the deadline elapses first. `timed_out` is set so the
/// caller can record it against the error/health layer.
pub async fn with_timeout<T, Fut, Fb>(timeout_ms: u64, op: Fut, fallback: Fb) -> (T, bool)
where
    Fut: Future<Output = T>,
    Fb: FnOnce() -> T,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), op).await {
        Ok(value) => (value, false),
        Err(_) => (fallback(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_op_result_when_it_finishes_in_time() {
        let (value, timed_out) = with_timeout(50, async { 7 }, || -1).await;
        assert_eq!(value, 7);
        assert!(!timed_out);
    }

    #[tokio::test]
    async fn falls_back_when_op_never_completes() {
        let (value, timed_out) = with_timeout(
            10,
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                7
            },
            || -1,
        )
        .await;
        assert_eq!(value, -1);
        assert!(timed_out);
    }
}
