//! Retry with capped exponential backoff for transient generation failures

use crate::config::GenerationSettings;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule: `base * 2^attempt`, never longer than `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Build from generation settings
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
        )
    }

    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&GenerationSettings::default())
    }
}

/// Execute `f` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors for which [`crate::Error::is_transient`] holds are retried.
pub async fn with_backoff<F, Fut, T>(policy: &RetryPolicy, label: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    attempt + 1,
                    policy.max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
