//! Retry with exponential backoff for fetch operations.

use crate::error::{RepositoryError, Result};
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration for artifact fetches.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Configuration with a specific retry bound.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_jitter()
    }
}

/// Run a fetch operation, retrying retryable failures with exponential
/// backoff. The last error surfaces once the bound is exhausted.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    operation
        .retry(config.build_backoff())
        .when(RepositoryError::is_retryable)
        .notify(|err: &RepositoryError, delay: Duration| {
            warn!(error = %err, delay = ?delay, "fetch failed, retrying");
        })
        .await
}
