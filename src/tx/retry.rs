//! Bounded retry with an explicit abort escape hatch
//!
//! The retried body reports its outcome as a tagged value instead of
//! signalling "stop retrying" through a sentinel error type, so the caller
//! can never observe wrapper internals: success is `Ok`, a retryable
//! failure is `Err(RetryError::Retryable(_))` and a deliberate bail-out is
//! `Err(RetryError::Abort(_))`. Both failure arms unwrap to the original
//! error at the call boundary.

use crate::config::RetryConfig;
use crate::metrics;

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Failure report from a retried body.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Ordinary failure, eligible for another attempt while budget remains.
    Retryable(E),
    /// Stop immediately; the budget is not consulted.
    Abort(E),
}

impl<E> RetryError<E> {
    /// The original error, regardless of which arm carried it.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Retryable(err) | RetryError::Abort(err) => err,
        }
    }
}

/// Lets bodies use `?` on their own error type; a propagated error is an
/// ordinary retryable failure.
impl<E> From<E> for RetryError<E> {
    fn from(err: E) -> Self {
        RetryError::Retryable(err)
    }
}

/// Attempt budget and pacing.
///
/// `retries` is the total number of attempts. The delay between attempts is
/// fixed; the upstream this was modeled on left the backoff curve to a
/// third-party default, so a concrete, boring policy is chosen here.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 4,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A budget of `retries` attempts with no pause between them.
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            delay: Duration::ZERO,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            retries: config.retries,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

/// Run `body` until it succeeds, aborts, or exhausts the attempt budget.
///
/// `body` receives the 1-based attempt number. On exhaustion the last
/// retryable error is returned unchanged; on abort the wrapped error is
/// returned without consulting the remaining budget.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut body: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let budget = policy.retries.max(1);
    let mut attempt = 1;

    loop {
        match body(attempt).await {
            Ok(value) => return Ok(value),
            Err(RetryError::Abort(err)) => return Err(err),
            Err(RetryError::Retryable(err)) => {
                if attempt >= budget {
                    return Err(err);
                }
                attempt += 1;
                metrics::record_retry_attempt();
                if !policy.delay.is_zero() {
                    sleep(policy.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_after_failures_uses_exact_attempt_count() {
        let mut calls = 0u32;
        let result: Result<u32, String> = retry(RetryPolicy::immediate(4), |attempt| {
            calls += 1;
            async move {
                if attempt < 4 {
                    Err(RetryError::Retryable(format!("attempt {} failed", attempt)))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_abort_fails_once_with_original_error() {
        let mut calls = 0u32;
        let result: Result<(), String> = retry(RetryPolicy::immediate(5), |_| {
            calls += 1;
            async { Err(RetryError::Abort("custom failure".to_string())) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "custom failure");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error_unchanged() {
        let mut calls = 0u32;
        let result: Result<(), String> = retry(RetryPolicy::immediate(3), |attempt| {
            calls += 1;
            async move { Err(RetryError::Retryable(format!("attempt {}", attempt))) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "attempt 3");
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_question_mark_maps_to_retryable() {
        fn fallible(attempt: u32) -> Result<u32, String> {
            if attempt < 2 {
                Err("transient".to_string())
            } else {
                Ok(attempt)
            }
        }

        let result: Result<u32, String> = retry(RetryPolicy::immediate(2), |attempt| async move {
            let value = fallible(attempt)?;
            Ok(value)
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            retries: 7,
            delay_ms: 250,
        });
        assert_eq!(policy.retries, 7);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_attempt_numbers_start_at_one() {
        let mut seen = Vec::new();
        let _: Result<(), &str> = retry(RetryPolicy::immediate(3), |attempt| {
            seen.push(attempt);
            async { Err(RetryError::Retryable("nope")) }
        })
        .await;

        assert_eq!(seen, vec![1, 2, 3]);
    }
}
