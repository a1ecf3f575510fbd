use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt * base_delay`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Linear,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts.
///
/// Every attempt is bounded by `attempt_timeout`, and an elapsed timeout is
/// retried like any transient failure. Both the attempt and the backoff sleep
/// race `cancel`; a fired token returns [`ProviderError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            outcome = tokio::time::timeout(policy.attempt_timeout, op(attempt)) => outcome,
        };

        let err = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Ok(Err(err)) if !err.is_retryable() => return Err(err),
            Ok(Err(err)) => err,
            Err(_) => ProviderError::Timeout(policy.attempt_timeout),
        };

        warn!(
            "{} attempt {}/{} failed: {}",
            operation, attempt, max_attempts, err
        );
        last_error = Some(err);

        if attempt < max_attempts {
            let delay = policy.delay_for(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    let last = last_error.unwrap_or_else(|| ProviderError::transient("no attempt was made"));
    Err(ProviderError::Exhausted {
        attempts: max_attempts,
        last: Box::new(last),
    })
}
