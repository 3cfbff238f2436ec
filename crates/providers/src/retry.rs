//! Retry with exponential backoff for transient provider failures.
//!
//! The policy is a plain value: an attempt cap, a base delay, and the
//! transient/fatal split delegated to [`LlmError::is_transient`]. Each
//! failed attempt either schedules a backoff or gives up; the last error
//! propagates to the caller unchanged.

use perceptor_core::error::LlmError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt cap and backoff curve for one logical provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait this long, then try again.
    Backoff(Duration),
    /// Propagate the error to the caller.
    GiveUp,
}

impl RetryPolicy {
    /// Decide the next step after 0-indexed `attempt` failed with `error`.
    /// The delay doubles per attempt: 1s, 2s, 4s with the default base.
    pub fn next_step(&self, attempt: u32, error: &LlmError) -> RetryStep {
        if !error.is_transient() || attempt + 1 >= self.max_attempts {
            RetryStep::GiveUp
        } else {
            RetryStep::Backoff(self.base_delay * 2u32.pow(attempt))
        }
    }
}

/// Drive `call` under `policy` until it succeeds or the policy gives up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.next_step(attempt, &error) {
                RetryStep::Backoff(delay) => {
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryStep::GiveUp => return Err(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the first `failures` calls with a fixed error, then succeeds.
    struct Flaky {
        failures: Mutex<usize>,
        calls: Mutex<usize>,
        error: LlmError,
    }

    impl Flaky {
        fn new(failures: usize, error: LlmError) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
                error,
            }
        }

        async fn call(&self) -> Result<&'static str, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                Err(self.error.clone())
            } else {
                Ok("done")
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_failures_with_growing_delays() {
        let flaky = Flaky::new(2, LlmError::RateLimited { retry_after_secs: 1 });
        let started = tokio::time::Instant::now();

        let result = with_retry(&RetryPolicy::default(), || flaky.call()).await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(flaky.calls(), 3);
        // 1s after the first failure, 2s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_propagate_the_last_error() {
        let flaky = Flaky::new(10, LlmError::Network("connection reset".into()));

        let result = with_retry(&RetryPolicy::default(), || flaky.call()).await;

        assert!(matches!(result.unwrap_err(), LlmError::Network(_)));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_errors_never_retry() {
        let flaky = Flaky::new(10, LlmError::Auth("bad key".into()));

        let result = with_retry(&RetryPolicy::default(), || flaky.call()).await;

        assert!(matches!(result.unwrap_err(), LlmError::Auth(_)));
        assert_eq!(flaky.calls(), 1);
    }

    #[test]
    fn policy_steps_follow_the_backoff_curve() {
        let policy = RetryPolicy::default();
        let transient = LlmError::Network("reset".into());

        assert_eq!(
            policy.next_step(0, &transient),
            RetryStep::Backoff(Duration::from_secs(1))
        );
        assert_eq!(
            policy.next_step(1, &transient),
            RetryStep::Backoff(Duration::from_secs(2))
        );
        assert_eq!(policy.next_step(2, &transient), RetryStep::GiveUp);

        let fatal = LlmError::Auth("bad key".into());
        assert_eq!(policy.next_step(0, &fatal), RetryStep::GiveUp);
    }
}
