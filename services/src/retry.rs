//! Bounded retry with a fixed or exponential delay between attempts.

use std::future::Future;
use std::time::Duration;

use crate::ServiceError;

/// Wait inserted before each retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delay {
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Delay {
    /// Delay before retry number `retry` (1 for the first retry).
    pub fn before_retry(&self, retry: u32) -> Duration {
        match *self {
            Delay::Fixed(delay) => delay,
            Delay::Exponential { base, max } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub delay: Delay,
    /// Abandon an attempt that runs longer than this.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Delay::Fixed(Duration::from_secs(1)),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay: Delay::Fixed(delay),
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Run `op` until it succeeds or the attempts are used up, retrying
    /// every error. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run_if(label, op, |_| true).await
    }

    /// Like [`run`](Self::run), but an error rejected by `should_retry` is
    /// returned immediately.
    pub async fn run_if<T, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        should_retry: P,
    ) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        P: Fn(&ServiceError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match self.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, op())
                    .await
                    .unwrap_or_else(|_| Err(ServiceError::Timeout(limit))),
                None => op().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !should_retry(&err) {
                if attempt > 1 {
                    tracing::warn!(op = label, attempts = attempt, error = %err, "giving up");
                }
                return Err(err);
            }

            let delay = self.delay.before_retry(attempt);
            tracing::warn!(
                op = label,
                attempt,
                max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
