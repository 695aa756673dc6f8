//! Timeouts and cancellation for backend calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{RagError, Result};

/// Run `call`, failing with [`RagError::Timeout`] once `timeout` elapses or
/// [`RagError::Cancelled`] as soon as `cancel` fires.
///
/// The future is dropped on either outcome, so no worker is left waiting on
/// an abandoned backend.
pub async fn bounded<T, F>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled { operation: operation.to_string() }),
        outcome = tokio::time::timeout(timeout, call) => match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_secs = timeout.as_secs_f32(), "backend call timed out");
                Err(RagError::Timeout { operation: operation.to_string(), timeout })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let token = CancellationToken::new();
        let result: Result<()> = bounded("embed", Duration::from_secs(5), &token, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RagError::Timeout { ref operation, .. }) if operation == "embed"));
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u8> =
            bounded("generate", Duration::from_secs(5), &token, async { Ok(1) }).await;
        assert!(matches!(result, Err(RagError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let token = CancellationToken::new();
        let result = bounded("embed", Duration::from_secs(5), &token, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
