//! Retry with exponential backoff for store calls.

use std::future::Future;

use tracing::{debug, warn};

use crate::{config::RetryConfig, store::StoreResult};

/// Run `operation`, retrying transient [`StoreError`](crate::store::StoreError)s according to `config`.
///
/// Non-transient errors are returned immediately. When retries are
/// exhausted the last error is returned.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    if !config.enabled {
        return operation().await;
    }

    let max_attempts = config.max_retries + 1; // +1 for initial attempt
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    error = %error,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "Transient store error, will retry after delay"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 0 {
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts"
                    );
                }
                return Err(error);
            }
        }
    }
}
