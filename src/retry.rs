//! Retry with linear backoff and random jitter.
//!
//! Fetching, storage writes and email sends all retry the same way, so the
//! backoff math and logging live here and each call site supplies only the
//! operation and a predicate saying which errors are worth retrying.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::info;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Base delay, multiplied by the attempt number.
    pub delay: Duration,
    /// Upper bound on any single wait, jitter included.
    pub max_delay: Duration,
    /// Random extra delay in `[0, max_jitter]` added to every wait.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Policy with the standard timings: 1s linear steps, 10s jitter, 2 minute cap.
    #[must_use]
    pub const fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            max_jitter: Duration::from_secs(10),
        }
    }

    /// Policy that retries without sleeping. Intended for tests.
    #[must_use]
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.delay.saturating_mul(attempt);
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        base.saturating_add(jitter).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects, or
/// the policy's attempts are exhausted. The last error is returned.
///
/// # Errors
///
/// Returns the error from the final attempt.
pub async fn retry<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: Op,
    is_retryable: P,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                let wait = policy.delay_for(attempt);
                info!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying after error"
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &RetryPolicy::immediate(5),
            "flaky",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(
            &RetryPolicy::immediate(4),
            "always fails",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry(
            &RetryPolicy::immediate(10),
            "forbidden",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("403".to_string())
            },
            |e| e != "403",
        )
        .await;

        assert_eq!(result, Err("403".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_linear_and_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for(9), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::with_attempts(10);
        for attempt in 1..=10 {
            let delay = policy.delay_for(attempt);
            let base = Duration::from_secs(u64::from(attempt));
            assert!(delay >= base.min(policy.max_delay));
            assert!(delay <= policy.max_delay);
            assert!(delay <= base + policy.max_jitter);
        }
    }
}
