//! Rate limit enforcement shared by the use cases

use platform::rate_limit::{RateLimitConfig, RateLimitStore};

use crate::error::{TrialError, TrialResult};

/// Count an attempt for `key`; deny with `RateLimited` once over the limit
///
/// A failing backend is logged and the attempt allowed: the limiter is a
/// best-effort deterrent, not a security boundary.
pub async fn enforce<L>(limiter: &L, key: &str, config: &RateLimitConfig) -> TrialResult<()>
where
    L: RateLimitStore,
{
    match limiter.check_and_increment(key, config).await {
        Ok(result) if result.allowed => Ok(()),
        Ok(result) => {
            tracing::warn!(
                key,
                max_requests = config.max_requests,
                "Rate limit hit"
            );
            Err(TrialError::RateLimited {
                retry_after_secs: result.retry_after_secs.unwrap_or(1),
            })
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Rate limit backend failed, allowing request");
            Ok(())
        }
    }
}
