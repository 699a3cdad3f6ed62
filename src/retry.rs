//! Exponential backoff for transient API failures
//!
//! The Nudge API occasionally answers with 429 or 5xx while a tenant's
//! inventory is being recomputed. Requests that fail that way are retried
//! a bounded number of times; every other failure is returned immediately.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff parameters for a single logical request
///
/// # Examples
///
/// ```
/// use nudge_bot::retry::RetryConfig;
///
/// let config = RetryConfig {
///     max_attempts: 5,
///     initial_backoff_ms: 50,
///     backoff_factor: 3.0,
///     max_backoff_ms: 2_000,
///     add_jitter: false,
/// };
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    /// Spread retries by +/-10% so parallel invocations do not line up
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            backoff_factor: 2.0,
            max_backoff_ms: 5_000,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delay_for(&self, backoff_ms: u64) -> Duration {
        let ms = if self.add_jitter {
            let factor = rand::random::<f64>() * 0.2 + 0.9;
            (backoff_ms as f64 * factor) as u64
        } else {
            backoff_ms
        };
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// `config.max_attempts` is exhausted. The last error is returned as-is.
///
/// # Examples
///
/// ```
/// use nudge_bot::retry::{with_exponential_backoff, RetryConfig};
///
/// # async fn example() -> Result<(), String> {
/// let value = with_exponential_backoff(
///     || async { Ok::<_, String>(7) },
///     |err: &String| err.contains("429"),
///     &RetryConfig::default(),
/// )
/// .await?;
/// assert_eq!(value, 7);
/// # Ok(())
/// # }
/// ```
pub async fn with_exponential_backoff<F, Fut, T, E, R>(
    mut operation: F,
    is_retriable: R,
    config: &RetryConfig,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut backoff_ms = config.initial_backoff_ms;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        attempt += 1;
        if attempt >= config.max_attempts || !is_retriable(&err) {
            if attempt > 1 {
                warn!("Giving up after {} attempts", attempt);
            }
            return Err(err);
        }

        let delay = config.delay_for(backoff_ms);
        debug!(
            "Retry attempt {}/{} after {}ms delay",
            attempt,
            config.max_attempts,
            delay.as_millis()
        );
        sleep(delay).await;

        backoff_ms = ((backoff_ms as f64 * config.backoff_factor) as u64).min(config.max_backoff_ms);
    }
}
