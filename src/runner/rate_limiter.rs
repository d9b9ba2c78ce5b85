//! @ai:module:intent Per-provider token-bucket rate limiting
//! @ai:module:layer infrastructure
//! @ai:module:public_api RateLimiter, RateLimiterTrait
//! @ai:module:stateless false

use crate::config::RateLimitPolicy;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// @ai:intent Trait for rate limiting functionality
pub trait RateLimiterTrait: Send + Sync {
    /// @ai:intent Wait until a request is allowed
    fn wait(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// @ai:intent Token bucket refilled continuously at requests_per_minute / 60 per second
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
    requests_per_minute: u32,
    capacity: f64,
}

struct RateLimiterState {
    tokens: f64,
    last_update: Instant,
}

impl RateLimiter {
    /// @ai:intent Create a limiter whose burst is one second worth of requests
    /// @ai:pre requests_per_minute > 0
    /// @ai:effects pure
    pub fn new(requests_per_minute: u32) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let capacity = (requests_per_minute as f64 / 60.0).ceil().max(1.0);

        Self {
            state: Mutex::new(RateLimiterState {
                tokens: capacity,
                last_update: Instant::now(),
            }),
            requests_per_minute,
            capacity,
        }
    }

    pub fn from_policy(policy: &RateLimitPolicy) -> Self {
        Self::new(policy.requests_per_minute)
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    fn refill_rate_per_sec(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }

    /// @ai:intent Refill tokens based on elapsed time
    /// @ai:effects state:write
    fn refill_tokens(&self, state: &mut RateLimiterState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update);
        let tokens_to_add = elapsed.as_secs_f64() * self.refill_rate_per_sec();
        state.tokens = (state.tokens + tokens_to_add).min(self.capacity);
        state.last_update = now;
    }
}

impl RateLimiterTrait for RateLimiter {
    /// @ai:intent Wait until a request is allowed, sleeping instead of spinning
    /// @ai:effects state:write, time
    async fn wait(&self) {
        loop {
            let sleep_duration = {
                let mut state = self.state.lock().await;
                self.refill_tokens(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let tokens_needed = 1.0 - state.tokens;
                Duration::from_secs_f64(tokens_needed / self.refill_rate_per_sec())
            };

            tokio::time::sleep(sleep_duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let limiter = RateLimiter::new(600);

        let start = std::time::Instant::now();
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rate_limiter_throttles_excess_requests() {
        let limiter = RateLimiter::new(600);

        for _ in 0..10 {
            limiter.wait().await;
        }

        let start = std::time::Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_low_rate_has_unit_burst() {
        let limiter = RateLimiter::new(30);
        assert!((limiter.capacity - 1.0).abs() < f64::EPSILON);
        assert_eq!(limiter.requests_per_minute(), 30);
    }
}
