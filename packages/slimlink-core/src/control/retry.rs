//! Retry logic for transient control failures.
//!
//! Only play and pause are retried: they are idempotent on the server and
//! the user is waiting on them.

use std::time::Duration;

use super::ControlResult;

/// Delays before each retry. Two retries at most.
const RETRY_DELAYS_MS: [u64; 2] = [250, 750];

/// Executes a control request, retrying transient failures.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the request
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> ControlResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ControlResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() && attempt < RETRY_DELAYS_MS.len() => {
                let delay_ms = RETRY_DELAYS_MS[attempt];
                attempt += 1;
                log::warn!(
                    "[JsonRpc] {} transient error: {} (retry {}/{} in {}ms)",
                    action,
                    e,
                    attempt,
                    RETRY_DELAYS_MS.len(),
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
