//! Retry with exponential backoff for single remote calls

use crate::error::{ApiError, ErrorKind};
use crate::notifier::{Notice, Notifier};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the retry policy
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub initial_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_jitter: Duration::ZERO,
        }
    }
}

pub struct RetryPolicy {
    config: RetryConfig,
    notifier: Arc<dyn Notifier>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with the configured attempt budget and delay.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.execute_with(
            label,
            self.config.max_attempts,
            self.config.initial_delay,
            operation,
        )
        .await
    }

    /// Run `operation`, retrying transient and unclassified failures.
    ///
    /// Authentication, rate-limit and client errors are returned after the
    /// first attempt. Rate limits are never waited out here; the caller gets
    /// the wait hint and decides what to tell the user. When the budget runs
    /// out the last error comes back wrapped in [`ApiError::Exhausted`].
    pub async fn execute_with<T, F, Fut>(
        &self,
        label: &str,
        max_attempts: u32,
        initial_delay: Duration,
        mut operation: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut notified = false;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            warn!(
                "{} failed (attempt {}/{}): {}",
                label, attempt, max_attempts, error
            );

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= max_attempts {
                return Err(ApiError::Exhausted {
                    label: label.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            // One notice per operation, not one per retry
            if error.kind() == ErrorKind::TransientService && !notified {
                self.notifier.notify(Notice::warning(format!(
                    "The service is temporarily unavailable, retrying {label}..."
                )));
                notified = true;
            }

            let delay = self.backoff_delay(initial_delay, attempt);
            debug!("Retrying {} in {:?}", label, delay);
            sleep(delay).await;
        }
    }

    /// Delay after the given (1-based) failed attempt.
    fn backoff_delay(&self, initial_delay: Duration, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = initial_delay.saturating_mul(1u32 << exponent);

        let max_jitter_ms = self.config.max_jitter.as_millis() as u64;
        if max_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=max_jitter_ms);
        base + Duration::from_millis(jitter)
    }
}
