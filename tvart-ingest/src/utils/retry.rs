//! Bounded retry for transient failures

use std::future::Future;
use std::time::Duration;

/// Retry `operation` while `is_transient` classifies its error as transient.
///
/// At most `max_attempts` calls are made (a value of 0 is treated as 1).
/// Non-transient errors are returned immediately, and the last transient
/// error is returned once the attempts are exhausted.
pub async fn retry_transient<F, Fut, T, E, P>(
    operation_name: &str,
    max_attempts: u32,
    delay: Duration,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_transient(&e) && attempt < max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Transient failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                if is_transient(&e) {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                }
                return Err(e);
            }
        }
    }
}
