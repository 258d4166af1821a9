//! Retry with exponential backoff.
//!
//! The policy is a pure function of the retry number ([`calculate_backoff`]);
//! [`RetryExecutor`] composes it with a single fallible call in an explicit
//! loop. Delays go through a [`Sleeper`] so the schedule can be observed.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{NodeError, NodeResult};

/// Retry configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries performed after the initial call fails.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(60_000),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Calculates the delay before retry number `retry` (starting at 1).
pub fn calculate_backoff(retry: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_backoff.as_millis() as f64;
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let exp = config.multiplier.powi(exponent);
    let max = config.max_backoff.as_millis() as f64;
    let mut delay = (base * exp).min(max);

    if config.jitter {
        use rand::Rng;
        let jitter = rand::thread_rng().gen_range(0.0..=delay * 0.1);
        delay = (delay + jitter).min(max);
    }

    Duration::from_millis(delay.round() as u64)
}

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry executor with exponential backoff.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    /// Creates a new retry executor sleeping on the tokio timer.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Creates a retry executor with a custom sleeper.
    pub fn with_sleeper(config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes an operation with retry logic.
    ///
    /// Validation errors are returned as-is without retrying. Any other error
    /// triggers up to `max_retries` further calls; when they all fail the last
    /// error is wrapped in [`NodeError::RetryExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> NodeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = NodeResult<T>>,
    {
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if retries > 0 {
                        debug!(retries, "Operation succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(error) if error.is_validation() => return Err(error),
                Err(error) => {
                    if retries >= self.config.max_retries {
                        if self.config.max_retries == 0 {
                            return Err(error);
                        }
                        return Err(NodeError::RetryExhausted {
                            attempts: retries + 1,
                            last_error: Box::new(error),
                        });
                    }

                    retries += 1;
                    let backoff = calculate_backoff(retries, &self.config);
                    warn!(
                        attempt = retries,
                        delay_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Operation failed, retrying"
                    );
                    self.sleeper.sleep(backoff).await;
                }
            }
        }
    }
}
