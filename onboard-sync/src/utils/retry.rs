//! Bounded retry with linearly increasing backoff
//!
//! After failed attempt `n` the caller waits `n × backoff_unit` before attempt
//! `n + 1`. No wait follows the final attempt. With 3 attempts and a 1000 ms unit
//! the attempts start at roughly t=0, t=1s, t=3s.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Wait inserted after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

/// All attempts failed
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: Display> Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempts)", self.last_error, self.attempts)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up
///
/// `operation` receives the 1-based attempt number. On success returns the
/// value and the attempt that produced it.
pub async fn retry_linear<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(err) if attempt >= policy.max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Giving up after final attempt"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying after backoff"
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
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_first_attempt_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let (value, attempts) = retry_linear("op", &policy, |_| async { Ok::<_, String>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let recorded = starts.clone();
        let result = retry_linear("op", &policy, move |_| {
            recorded.lock().unwrap().push(Instant::now());
            async { Err::<(), _>("nope".to_string()) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, "nope");

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        assert!(starts[1] - starts[0] >= Duration::from_millis(1000));
        assert!(starts[2] - starts[1] >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        let (value, attempts) = retry_linear("op", &policy, |attempt| async move {
            if attempt < 2 {
                Err("transient".to_string())
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_after(3), Duration::from_millis(15));
    }
}
