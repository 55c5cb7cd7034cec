//! Application Configuration
//!
//! Configuration for the trial application layer.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::domain::value_objects::{PlanId, ReferrerAllowList};

/// Re-export from platform
pub use platform::cookie::{CookieConfig, SameSite};
pub use platform::rate_limit::RateLimitConfig;

/// Default plan catalog: plan 1 grants one hour, plan 2 grants two
pub const DEFAULT_PLANS: &str = "1:1,2:2";

/// Longest pending lifetime accepted from configuration
pub const MAX_PENDING_TTL_SECS: u64 = 3600;

/// Plan catalog parse error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanCatalogError {
    #[error("invalid plan entry '{0}', expected <plan>:<hours>")]
    InvalidEntry(String),

    #[error("duplicate plan id {0}")]
    Duplicate(u32),

    #[error("plan catalog is empty")]
    Empty,
}

/// Maps plan ids to trial durations in hours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: BTreeMap<PlanId, u32>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let mut plans = BTreeMap::new();
        for id in [1, 2] {
            if let Some(plan) = PlanId::new(id) {
                plans.insert(plan, id);
            }
        }
        Self { plans }
    }
}

impl PlanCatalog {
    /// Parse `<plan>:<hours>` pairs separated by commas
    pub fn parse(raw: &str) -> Result<Self, PlanCatalogError> {
        let mut plans = BTreeMap::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || PlanCatalogError::InvalidEntry(entry.to_string());
            let (plan, hours) = entry.split_once(':').ok_or_else(invalid)?;
            let plan = plan
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(PlanId::new)
                .ok_or_else(invalid)?;
            let hours = hours
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(invalid)?;

            if plans.insert(plan, hours).is_some() {
                return Err(PlanCatalogError::Duplicate(plan.get()));
            }
        }

        if plans.is_empty() {
            return Err(PlanCatalogError::Empty);
        }
        Ok(Self { plans })
    }

    /// Resolve a raw plan id to a known plan
    pub fn resolve(&self, raw: u32) -> Option<PlanId> {
        PlanId::new(raw).filter(|p| self.plans.contains_key(p))
    }

    pub fn hours_for(&self, plan: PlanId) -> Option<u32> {
        self.plans.get(&plan).copied()
    }

    pub fn plans(&self) -> impl Iterator<Item = (PlanId, u32)> + '_ {
        self.plans.iter().map(|(p, h)| (*p, *h))
    }
}

/// Trial application configuration
#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Plan id -> trial hours
    pub plans: PlanCatalog,
    /// Lifetime of a pending (and completed) verification record
    pub pending_ttl: Duration,
    /// Referrer hosts a callback may come from; empty disables the check
    pub allowed_referrers: ReferrerAllowList,
    /// UI location the callback redirects to
    pub ui_redirect_path: String,
    /// Issuance limit per client IP
    pub issue_rate_limit: RateLimitConfig,
    /// Start limit per client IP
    pub start_rate_limit: RateLimitConfig,
    /// Cookie echoing the client session id
    pub session_cookie: CookieConfig,
    /// Generated password length
    pub password_length: usize,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            plans: PlanCatalog::default(),
            pending_ttl: Duration::from_secs(600),
            allowed_referrers: ReferrerAllowList::default(),
            ui_redirect_path: "/".to_string(),
            issue_rate_limit: RateLimitConfig::new(5, 3600),
            start_rate_limit: RateLimitConfig::new(20, 600),
            session_cookie: CookieConfig {
                name: "trial_session".to_string(),
                secure: true,
                http_only: true,
                same_site: SameSite::Lax,
                path: "/".to_string(),
                max_age_secs: Some(86_400),
            },
            password_length: 16,
        }
    }
}

impl TrialConfig {
    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        let mut config = Self::default();
        config.session_cookie.secure = false;
        config
    }

    pub fn pending_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.pending_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(MAX_PENDING_TTL_SECS as i64))
    }

    /// Redirect target for a callback, `<ui>?<query>`
    pub fn redirect_location(&self, query: &str) -> String {
        let separator = if self.ui_redirect_path.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}{}", self.ui_redirect_path, separator, query)
    }
}
