//! Token-bucket pacing for outbound API calls
//!
//! Bulk commands can issue one search plus one write per input line, which
//! for a few thousand lines is enough to trip the API's per-tenant limits.
//! Every request made through [`crate::http::HttpClient`] takes one token
//! first. Requests are issued one at a time, so there is no concurrency
//! limit here, only a rate.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: usize,
    last_refill: Instant,
}

/// A token bucket refilled in whole periods
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    period: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Allows `requests_per_period` requests per `period`, starting with a full bucket.
    ///
    /// A capacity of zero is treated as one so that `acquire` always terminates.
    pub fn new(requests_per_period: usize, period: Duration) -> Self {
        let capacity = requests_per_period.max(1);
        Self {
            capacity,
            period,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_minute(requests: usize) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            let wait = self.try_acquire().await;
            if wait.is_zero() {
                return;
            }
            debug!("API rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Takes a token if one is available, otherwise returns how long to wait
    /// for the next refill.
    async fn try_acquire(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);

        if elapsed >= self.period {
            let periods = (elapsed.as_millis() / self.period.as_millis().max(1)) as u32;
            bucket.tokens = self.capacity;
            bucket.last_refill += self.period * periods;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            Duration::ZERO
        } else {
            self.period.saturating_sub(now.duration_since(bucket.last_refill))
        }
    }

    /// Tokens left in the current period
    pub async fn available(&self) -> usize {
        self.bucket.lock().await.tokens
    }
}

/// Default pacing for the Nudge API, overridable with `--rate-limit`
pub fn create_nudge_api_limiter(requests_per_minute: usize) -> RateLimiter {
    RateLimiter::per_minute(requests_per_minute)
}
