//! Retry envelope for remote operations.
//!
//! Wraps one remote call with a bounded number of attempts and exponential
//! backoff between them. Only errors that report themselves as transient are
//! retried; anything else is handed back after the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Classifies an error as worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles on each further failure.
    pub base_delay: Duration,
    /// Upper bound for a single delay (before jitter).
    pub max_delay: Duration,
    /// Add up to a quarter of the delay as random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Jitter never exceeds a quarter of the delay, so consecutive delays keep
    /// growing until `max_delay` is reached.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        if !self.jitter {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
    }
}

/// Why a retried operation finally failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Non-retryable failure, returned without consuming further attempts.
    #[error("{0}")]
    Aborted(E),
    /// Every attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(op, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(RetryError::Aborted(e)),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(op, attempts = attempt, error = %e, "Giving up");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, backing off"
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
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Flaky {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            *self == Flaky::Transient
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(10)).without_jitter()
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_growing_delays() {
        let mut stamps = Vec::new();
        let result = retry(&policy(), "flaky", || {
            stamps.push(Instant::now());
            let n = stamps.len();
            async move { if n < 3 { Err(Flaky::Transient) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(stamps.len(), 3);
        let first_gap = stamps[1] - stamps[0];
        let second_gap = stamps[2] - stamps[1];
        assert!(first_gap >= Duration::from_millis(10));
        assert!(second_gap > first_gap, "{second_gap:?} should exceed {first_gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_fails_after_one_attempt() {
        let mut calls = 0;
        let result: Result<(), _> = retry(&policy(), "fatal", || {
            calls += 1;
            async { Err(Flaky::Fatal) }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Aborted(Flaky::Fatal))));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let mut calls = 0;
        let result: Result<(), _> = retry(&policy(), "down", || {
            calls += 1;
            async { Err(Flaky::Transient) }
        })
        .await;

        assert_eq!(calls, 5);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last, Flaky::Transient);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
    }

    #[test]
    fn jitter_keeps_delays_increasing() {
        let p = RetryPolicy::new(5, Duration::from_millis(100));
        for _ in 0..50 {
            assert!(p.backoff(1) < p.backoff(2));
            assert!(p.backoff(2) < p.backoff(3));
        }
    }
}
