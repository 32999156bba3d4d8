use log::{error, warn};
use std::future::Future;
use std::time::Duration;

use crate::app_config::PipelineSettings;
use crate::errors::ProviderError;

/// Retry policy for external calls.
///
/// Transient failures are retried with exponential backoff up to
/// `max_attempts` total attempts; anything the predicate rejects fails on
/// the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further retry
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Decides whether a failure is worth retrying
    pub is_transient: fn(&ProviderError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.retry_count + 1,
            base_delay: Duration::from_millis(settings.retry_backoff_ms),
            max_delay: Duration::from_millis(settings.max_backoff_ms),
            is_transient: ProviderError::is_transient,
        }
    }

    /// Policy without delays, for tests and offline runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            is_transient: ProviderError::is_transient,
        }
    }

    pub fn with_predicate(mut self, is_transient: fn(&ProviderError) -> bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. The closure receives the 1-based attempt number.
    ///
    /// Returns the final result together with the number of attempts made.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> (Result<T, ProviderError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(error) => error,
            };

            if !(self.is_transient)(&error) {
                error!("{}: permanent failure on attempt {}: {}", label, attempt, error);
                return (Err(error), attempt);
            }
            if attempt >= max_attempts {
                error!("{}: giving up after {} attempt(s): {}", label, attempt, error);
                return (Err(error), attempt);
            }

            let delay = self.delay_for_retry(attempt);
            warn!(
                "{}: transient failure ({}), attempt {}/{}, retrying in {}ms",
                label,
                error,
                attempt,
                max_attempts,
                delay.as_millis()
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
