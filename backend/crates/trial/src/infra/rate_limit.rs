//! Rate limiter backend selection

use platform::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimitResult, RateLimitStore};

use crate::infra::postgres::PgTrialRepository;

/// Where rate-limit counters live
///
/// `Memory` is single-instance only and resets on restart; `Postgres`
/// shares counters between instances.
pub enum RateLimiterBackend {
    Memory(InMemoryRateLimiter),
    Postgres(PgTrialRepository),
}

impl RateLimiterBackend {
    pub fn memory() -> Self {
        RateLimiterBackend::Memory(InMemoryRateLimiter::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            RateLimiterBackend::Memory(_) => "memory",
            RateLimiterBackend::Postgres(_) => "postgres",
        }
    }
}

impl RateLimitStore for RateLimiterBackend {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            RateLimiterBackend::Memory(limiter) => Ok(limiter.check(key, config)),
            RateLimiterBackend::Postgres(repo) => repo.check_and_increment(key, config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_delegates() {
        let backend = RateLimiterBackend::memory();
        let config = RateLimitConfig::new(1, 60);
        assert_eq!(backend.name(), "memory");

        assert!(backend.check_and_increment("gen:a", &config).await.unwrap().allowed);
        let denied = backend.check_and_increment("gen:a", &config).await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs.unwrap() >= 1);
    }
}
