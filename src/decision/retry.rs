//! Retry policy shared by every reasoning-engine call site.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tracing::debug;

use crate::errors::AgentError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random, 0.0 to disable.
    pub jitter: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: AgentError },
}

impl RetryPolicy {
    /// Single attempt, no backoff. Used for speeches.
    pub fn single(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jitter = if jitter_range > 0.0 {
            (random::<f64>() * 2.0 - 1.0) * jitter_range
        } else {
            0.0
        };
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Each attempt is bounded by
    /// `attempt_timeout`. There is no sleep after the final attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout {
                    secs: self.attempt_timeout.as_secs_f64(),
                }),
            };

            match result {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(err) if attempt >= max_attempts => {
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: err,
                    };
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        error = %err,
                        attempt,
                        retryable = err.is_retryable(),
                        retry_delay_secs = delay.as_secs_f64(),
                        "Reasoning engine attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(10), Duration::from_secs(3));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter: 0.25,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let delay = policy.delay_for(2).as_secs_f64();
            assert!((1.5..=2.5).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let outcome = policy
            .run(|_| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AgentError::Transport("reset".into()))
                    } else {
                        Ok(5u32)
                    }
                }
            })
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                value: 5,
                attempts: 3
            }
        );
        // 1s after the first failure, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_does_not_sleep_after_last_attempt() {
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let outcome: RetryOutcome<u32> = policy.run(|_| async { Err(AgentError::NoAnswer) }).await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 3,
                last_error: AgentError::NoAnswer
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::single(Duration::from_secs(5));

        let outcome: RetryOutcome<u32> = policy
            .run(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 1,
                last_error: AgentError::Timeout { .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_number_is_passed_to_op() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::default();

        let _: RetryOutcome<()> = policy
            .run(|attempt| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(attempt);
                    Err(AgentError::NoAnswer)
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
