//! Rate Limiting Infrastructure
//!
//! Fixed-window counters keyed by an opaque identifier (usually
//! `<action>:<client ip>`).
//!
//! [`InMemoryRateLimiter`] keeps its table in process memory. It resets on
//! restart and is NOT shared between instances: running N replicas behind a
//! load balancer multiplies the effective limit by N. That is acceptable only
//! because the limiter is a best-effort abuse deterrent, not a security
//! boundary. Deployments with more than one instance should use a shared
//! [`RateLimitStore`] implementation instead.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

/// Tables larger than this are swept for elapsed windows on insert
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
    /// Seconds until the window resets; only set when denied
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// Build a result from the post-increment count of a window
    pub fn from_count(count: u32, config: &RateLimitConfig, reset_at_ms: i64, now_ms: i64) -> Self {
        let allowed = count <= config.max_requests;
        Self {
            allowed,
            remaining: config.max_requests.saturating_sub(count),
            reset_at_ms,
            retry_after_secs: (!allowed).then(|| retry_after_secs(reset_at_ms, now_ms)),
        }
    }
}

/// `ceil((reset_at - now) / 1000)`, never below one second
pub fn retry_after_secs(reset_at_ms: i64, now_ms: i64) -> u64 {
    let remaining_ms = (reset_at_ms - now_ms).max(0) as u64;
    remaining_ms.div_ceil(1000).max(1)
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Check and increment rate limit counter
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// Process-local fixed-window limiter
///
/// Never fails: every call returns a definite allow/deny.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and count an attempt for `key` at the current wall-clock time
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        self.check_at(key, config, Utc::now().timestamp_millis())
    }

    /// Check and count an attempt for `key` at `now_ms`
    ///
    /// The first attempt opens a window ending at `now + window`. Attempts
    /// before the end are counted until `max_requests` is reached; after that
    /// they are denied without being counted. Once the window has ended the
    /// next attempt opens a fresh one.
    pub fn check_at(&self, key: &str, config: &RateLimitConfig, now_ms: i64) -> RateLimitResult {
        // A poisoned lock still holds consistent counters.
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| w.reset_at_ms > now_ms);
        }

        let window = windows
            .entry(key.to_string())
            .and_modify(|w| {
                if now_ms >= w.reset_at_ms {
                    *w = Window {
                        count: 0,
                        reset_at_ms: now_ms + config.window_ms(),
                    };
                }
            })
            .or_insert(Window {
                count: 0,
                reset_at_ms: now_ms + config.window_ms(),
            });

        if window.count >= config.max_requests {
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at_ms: window.reset_at_ms,
                retry_after_secs: Some(retry_after_secs(window.reset_at_ms, now_ms)),
            };
        }

        window.count += 1;
        RateLimitResult::from_count(window.count, config, window.reset_at_ms, now_ms)
    }

    /// Number of tracked keys
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl RateLimitStore for InMemoryRateLimiter {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.check(key, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn test_five_allowed_sixth_denied_then_reset() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(5, 3600);
        let start = 1_000_000;

        for i in 0..5 {
            let result = limiter.check_at("gen:1.2.3.4", &config, start + i * 1000);
            assert!(result.allowed, "attempt {} should be allowed", i + 1);
            assert_eq!(result.remaining, 4 - i as u32);
        }

        let denied = limiter.check_at("gen:1.2.3.4", &config, start + 10_000);
        assert!(!denied.allowed);
        let retry = denied.retry_after_secs.unwrap();
        assert!(retry > 0);
        assert_eq!(retry, ((HOUR_MS - 10_000) / 1000) as u64);

        // After the window elapses the next call opens a fresh window
        let after = limiter.check_at("gen:1.2.3.4", &config, start + HOUR_MS + 1);
        assert!(after.allowed);
        assert_eq!(after.remaining, 4);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, 10);

        assert!(limiter.check_at("k", &config, 0).allowed);
        let denied = limiter.check_at("k", &config, 8_500);
        assert_eq!(denied.retry_after_secs, Some(2));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, 60);

        assert!(limiter.check_at("a", &config, 0).allowed);
        assert!(!limiter.check_at("a", &config, 1).allowed);
        assert!(limiter.check_at("b", &config, 1).allowed);
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_denied_attempts_do_not_extend_window() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, 60);

        assert!(limiter.check_at("k", &config, 0).allowed);
        for t in 1..10 {
            assert!(!limiter.check_at("k", &config, t * 1000).allowed);
        }
        assert!(limiter.check_at("k", &config, 60_000).allowed);
    }

    #[test]
    fn test_from_count() {
        let config = RateLimitConfig::new(3, 60);
        let ok = RateLimitResult::from_count(3, &config, 60_000, 0);
        assert!(ok.allowed);
        assert_eq!(ok.remaining, 0);
        assert_eq!(ok.retry_after_secs, None);

        let denied = RateLimitResult::from_count(4, &config, 60_000, 30_000);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(30));
    }

    #[tokio::test]
    async fn test_store_trait_never_fails() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::default();
        let result = RateLimitStore::check_and_increment(&limiter, "k", &config).await.unwrap();
        assert!(result.allowed);
    }
}
