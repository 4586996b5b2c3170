use crate::error::{Error, Result};
use crate::flatten::types::FlattenConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Linear backoff: failed attempt `n` waits `n * backoff_unit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        RetryPolicy {
            max_retries,
            backoff_unit,
        }
    }

    pub fn from_config(config: &FlattenConfig) -> Self {
        Self::new(config.max_retries, config.backoff_unit)
    }

    /// Total attempts allowed, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }

    /// Decide what follows failed attempt number `attempt`.
    ///
    /// Returns the delay to wait before trying again, or the error to
    /// surface when the failure is not transient or attempts are used up.
    pub fn on_failure(&self, attempt: u32, error: Error, source: &str) -> Result<Duration> {
        if !error.is_transient() {
            return Err(error);
        }

        if attempt >= self.max_attempts() {
            return Err(Error::ExhaustedRetries {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = self.delay_for(attempt);
        warn!(
            source,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        Ok(delay)
    }

    /// Run `op` until it succeeds or the policy gives up
    pub async fn run<T, F, Fut>(&self, source: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let delay = self.on_failure(attempt, error, source)?;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
