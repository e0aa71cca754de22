use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Bounded retry with exponential backoff, shared by the S3 and webhook calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    pub fn exponential(max_attempts: u32) -> Self {
        Self::new(max_attempts, INITIAL_DELAY, MAX_DELAY)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub async fn run<T, E, F, Fut, P>(
        &self,
        operation: &str,
        is_retryable: P,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => {
                    error!(operation, attempt, error = %err, "call failed with a non-retryable error");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    error!(operation, attempt, error = %err, "max retries reached");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "call failed, retrying"
                    );
                    tokio::time::sleep(self.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
