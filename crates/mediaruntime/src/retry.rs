use mediacore::{CapabilityError, EventEmitter, NodeError, RetryPolicy};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Invoke a capability with an optional per-attempt timeout, retrying
/// retryable failures according to `policy`.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    call_timeout: Option<Duration>,
    events: &EventEmitter,
    mut call: F,
) -> Result<T, NodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match call_timeout {
            Some(limit) => match timeout(limit, call()).await {
                Ok(result) => result.map_err(NodeError::from),
                Err(_) => Err(NodeError::Timeout {
                    millis: limit.as_millis() as u64,
                }),
            },
            None => call().await.map_err(NodeError::from),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let backoff = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying capability call"
                );
                events.warn(format!(
                    "Attempt {attempt}/{max_attempts} failed: {e}; retrying in {}ms",
                    backoff.as_millis()
                ));
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
