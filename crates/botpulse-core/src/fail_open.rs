//! Fail-open utilities for analytics side channels
//!
//! Every metric write goes through here. A write that fails is logged and
//! dropped; the conversation that triggered it carries on untouched.
//!
//! Points are never retried; a failed one is lost.

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use botpulse_core::fail_open::fail_open;
/// use botpulse_core::Result;
///
/// async fn send_point() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("metrics_writer", || send_point()).await.is_some();
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BotpulseError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, BotpulseError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_swallows_sink_error() {
        let result = fail_open("test_op", || async {
            Err::<(), _>(BotpulseError::SinkRejected {
                status: 401,
                body: "unauthorized".to_string(),
            })
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_runs_operation_once() {
        let mut attempts = 0;
        let result = fail_open("test_op", || {
            attempts += 1;
            async { Err::<i32, _>(BotpulseError::Sink("connection refused".to_string())) }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 1);
    }
}
