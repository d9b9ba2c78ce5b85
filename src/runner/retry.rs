//! @ai:module:intent Retry policy with exponential backoff and jitter
//! @ai:module:layer application
//! @ai:module:public_api RetryPolicy, RetryOutcome, RetryFailure, run_with_retry
//! @ai:module:stateless true

use crate::error::ProviderError;
use crate::runner::cell::CellState;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// @ai:intent Bounded retry configuration shared by invocations and judge calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// @ai:intent Upper bound of the delay before retry number `retry` (1-based)
    /// @ai:example (base=500, retry=3) -> 2000ms
    /// @ai:effects pure
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// @ai:intent Delay before retry number `retry`, honouring a server hint
    /// @ai:post result <= max_delay_ms
    /// @ai:effects random
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let ceiling = self.backoff_ceiling(retry);

        // Equal jitter: half fixed, half random.
        let delay = if self.jitter && ceiling.as_millis() > 1 {
            let ceiling_ms = ceiling.as_millis() as u64;
            let half = ceiling_ms / 2;
            Duration::from_millis(half + rand::thread_rng().gen_range(0..=ceiling_ms - half))
        } else {
            ceiling
        };

        let cap = Duration::from_millis(self.max_delay_ms);
        hint.map_or(delay, |h| delay.max(h)).min(cap)
    }

    /// @ai:intent Whether a failed attempt should be followed by another
    /// @ai:effects pure
    pub fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

/// @ai:intent Terminal failure of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure {
    /// Non-retryable error, or retryable error after the last attempt
    Failed(ProviderError),
    /// Cancellation arrived while waiting to retry
    Cancelled(ProviderError),
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RetryFailure>,
    pub attempts: u32,
}

/// @ai:intent Run `attempt` until success, a non-retryable error, or the attempt bound
/// @ai:pre the caller has already moved the cell to Dispatched
/// @ai:post attempts are strictly sequential; `observe` sees Retrying/Dispatched pairs
/// @ai:effects time
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut observe: impl FnMut(CellState),
    mut attempt: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let error = match attempt(attempts).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(error) => error,
        };

        if !policy.should_retry(attempts, &error) {
            return RetryOutcome {
                result: Err(RetryFailure::Failed(error)),
                attempts,
            };
        }

        observe(CellState::Retrying);
        let delay = policy.delay_for(attempts, error.retry_after);
        tracing::debug!(
            "Attempt {} failed ({}), retrying in {}ms",
            attempts,
            error,
            delay.as_millis()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return RetryOutcome {
                    result: Err(RetryFailure::Cancelled(error)),
                    attempts,
                };
            }
        }

        observe(CellState::Dispatched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 3000,
            jitter: false,
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(3000));
        assert_eq!(policy.backoff_ceiling(64), Duration::from_millis(3000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 400,
            max_delay_ms: 10_000,
            jitter: true,
        };
        for _ in 0..100 {
            let delay = policy.delay_for(2, None);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = fast_policy(3);
        let delay = policy.delay_for(1, Some(Duration::from_secs(60)));
        assert_eq!(delay, Duration::from_millis(5));
    }

    #[test]
    fn test_should_retry_respects_kind_and_bound() {
        let policy = fast_policy(3);
        let limited = ProviderError::rate_limited("slow down");
        let auth = ProviderError::auth_failed("nope");

        assert!(policy.should_retry(1, &limited));
        assert!(policy.should_retry(2, &limited));
        assert!(!policy.should_retry(3, &limited));
        assert!(!policy.should_retry(1, &auth));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let mut observed = Vec::new();

        let outcome = run_with_retry(
            &fast_policy(3),
            &CancellationToken::new(),
            |state| observed.push(state),
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::timeout("slow"))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(
            observed,
            vec![
                CellState::Retrying,
                CellState::Dispatched,
                CellState::Retrying,
                CellState::Dispatched
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail_with_last_error() {
        let outcome: RetryOutcome<()> = run_with_retry(
            &fast_policy(2),
            &CancellationToken::new(),
            |_| {},
            |_| async { Err(ProviderError::rate_limited("429")) },
        )
        .await;

        assert_eq!(outcome.attempts, 2);
        match outcome.result {
            Err(RetryFailure::Failed(e)) => assert_eq!(e.kind, ProviderErrorKind::RateLimited),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome: RetryOutcome<()> = run_with_retry(
            &RetryPolicy {
                max_attempts: 5,
                base_delay_ms: 60_000,
                max_delay_ms: 60_000,
                jitter: false,
            },
            &cancel,
            |_| {},
            |_| async { Err(ProviderError::timeout("slow")) },
        )
        .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(RetryFailure::Cancelled(_))));
    }
}
