//! Per-target retry: at most two tries with a fixed cooldown between them.
//! Covers the send and the handle lookup that precedes it.

use crate::clock::Sleeper;
use outreach_core::config::RetryConfig;
use outreach_core::types::DispatchAttempt;
use outreach_core::ServiceError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Hard ceiling on tries per operation.
pub const MAX_SEND_ATTEMPTS: u32 = 2;

/// Final failure for one target after retries.
#[derive(Debug, Error)]
#[error("send failed after {attempts} attempt(s): {error}")]
pub struct SendFailure {
    pub attempts: u32,
    pub error: ServiceError,
}

impl SendFailure {
    pub fn attempt(&self) -> DispatchAttempt {
        DispatchAttempt::failed(self.attempts, self.error.kind)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    cooldown: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.clamp(1, MAX_SEND_ATTEMPTS),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }

    /// Send with retry, reporting how many tries it took.
    pub async fn attempt<F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        operation: F,
    ) -> Result<DispatchAttempt, SendFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), ServiceError>>,
    {
        let ((), attempts) = self.execute(sleeper, operation).await?;
        Ok(DispatchAttempt::succeeded(attempts))
    }

    /// Run `operation` until it succeeds, the error is not transient, or the
    /// attempt budget is spent. Returns the value and the number of tries.
    pub async fn execute<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        operation: F,
    ) -> Result<(T, u32), SendFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(attempts, "Call succeeded after retry");
                    }
                    return Ok((value, attempts));
                }
                Err(error) => {
                    if attempts >= self.max_attempts || !error.kind.is_transient() {
                        warn!(attempts, kind = error.kind.as_str(), error = %error.message, "Call failed");
                        return Err(SendFailure { attempts, error });
                    }
                    debug!(
                        attempts,
                        kind = error.kind.as_str(),
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Transient failure, retrying after cooldown"
                    );
                    sleeper.sleep(self.cooldown).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::InstantSleeper;
    use outreach_core::types::AttemptOutcome;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        calls: AtomicU32,
        outcomes: Mutex<VecDeque<Result<(), ServiceError>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<(), ServiceError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                outcomes: Mutex::new(outcomes.into()),
            }
        }

        async fn call(&self) -> Result<(), ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_first_try_success() {
        let sleeper = InstantSleeper::new();
        let op = Scripted::new(vec![Ok(())]);
        let result = RetryPolicy::default().attempt(&sleeper, || op.call()).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome, AttemptOutcome::Success);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_transient_failure() {
        let sleeper = InstantSleeper::new();
        let op = Scripted::new(vec![Err(ServiceError::network("reset")), Ok(())]);
        let result = RetryPolicy::default().attempt(&sleeper, || op.call()).await.unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_never_more_than_two_attempts() {
        let sleeper = InstantSleeper::new();
        let op = Scripted::new(vec![
            Err(ServiceError::rate_limited("wait")),
            Err(ServiceError::rate_limited("wait")),
            Ok(()),
        ]);
        let mut config = RetryConfig::default();
        config.max_attempts = 10;
        let failure = RetryPolicy::new(&config)
            .attempt(&sleeper, || op.call())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.attempt().outcome, AttemptOutcome::TransientFailure);
        assert_eq!(op.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.waits().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let sleeper = InstantSleeper::new();
        let op = Scripted::new(vec![Err(ServiceError::not_found("ghost")), Ok(())]);
        let failure = RetryPolicy::default()
            .attempt(&sleeper, || op.call())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.error.kind, outreach_core::ServiceErrorKind::NotFound);
        assert_eq!(failure.attempt().outcome, AttemptOutcome::TerminalFailure);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let sleeper = InstantSleeper::new();
        let op = Scripted::new(vec![Err(ServiceError::network("down"))]);
        let config = RetryConfig {
            max_attempts: 0,
            cooldown_ms: 1,
        };
        let failure = RetryPolicy::new(&config)
            .attempt(&sleeper, || op.call())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_execute_returns_value_after_retry() {
        let sleeper = InstantSleeper::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (value, attempts) = RetryPolicy::default()
            .execute(&sleeper, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ServiceError::network("timeout"))
                } else {
                    Ok("17841400000000001".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "17841400000000001");
        assert_eq!(attempts, 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(30)]);
    }
}
