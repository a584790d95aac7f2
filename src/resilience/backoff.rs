//! # Bounded Exponential Backoff
//!
//! `retry_with_backoff` re-runs a fallible async operation on transient
//! failures, sleeping an exponentially growing, capped delay between
//! attempts. Permanent failures and retry exhaustion surface immediately.

use std::future::Future;
use tracing::{debug, warn};

use crate::config::BackoffConfig;
use crate::engine::StepError;

/// Retry `operation` up to `config.max_attempts` times on transient errors.
///
/// Permanent errors short-circuit. The final transient error is returned
/// as-is once attempts are exhausted, so callers see the underlying cause.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &BackoffConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, StepError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(StepError::Permanent(message)) => {
                return Err(StepError::Permanent(message));
            }
            Err(StepError::Transient(message)) => {
                if attempt >= config.max_attempts {
                    warn!(
                        operation = %operation_name,
                        attempts = attempt,
                        error = %message,
                        "Retries exhausted"
                    );
                    return Err(StepError::Transient(message));
                }
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transient failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = BackoffConfig::for_testing();
        let calls = Mutex::new(0u32);

        let result = retry_with_backoff(&config, "fetch_quote", || {
            let call = {
                let mut calls = calls.lock();
                *calls += 1;
                *calls
            };
            async move {
                if call < 3 {
                    Err(StepError::Transient("rate limited".to_string()))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_short_circuits() {
        let config = BackoffConfig::for_testing();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = retry_with_backoff(&config, "fetch_quote", || {
            *calls.lock() += 1;
            async { Err(StepError::Permanent("delisted".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(StepError::Permanent(_))));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_transient_error() {
        let config = BackoffConfig::for_testing();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = retry_with_backoff(&config, "fetch_quote", || {
            *calls.lock() += 1;
            async { Err(StepError::Transient("overloaded".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(StepError::Transient(_))));
        assert_eq!(*calls.lock(), config.max_attempts);
    }
}
