//! Runtime settings
//!
//! Read once at startup from the environment (after `.env` is loaded).
//! Invalid values abort startup instead of falling back to defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use trial::application::config::{MAX_PENDING_TTL_SECS, RateLimitConfig};
use trial::domain::value_objects::ReferrerAllowList;
use trial::{PlanCatalog, TrialConfig};

/// Where verification records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => bail!("unknown store '{other}', expected postgres or memory"),
        }
    }
}

/// Server settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub store: StoreKind,
    /// Unset leaves the postgres store unconfigured
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub rate_limit_backend: StoreKind,
    pub static_dir: PathBuf,
    pub trial: TrialConfig,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let parse = |name: &str, default: &str| -> anyhow::Result<u64> {
            let raw = get(name).unwrap_or_else(|| default.to_string());
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'"))
        };

        let mut trial = if cfg!(debug_assertions) {
            TrialConfig::development()
        } else {
            TrialConfig::default()
        };

        trial.plans = PlanCatalog::parse(&get("TRIAL_PLANS").unwrap_or_else(|| "1:1,2:2".into()))
            .context("TRIAL_PLANS")?;

        let pending_ttl_secs = parse("PENDING_TTL_SECS", "600")?;
        if !(1..=MAX_PENDING_TTL_SECS).contains(&pending_ttl_secs) {
            bail!("PENDING_TTL_SECS must be between 1 and {MAX_PENDING_TTL_SECS}");
        }
        trial.pending_ttl = Duration::from_secs(pending_ttl_secs);

        trial.allowed_referrers =
            ReferrerAllowList::parse(&get("ALLOWED_REFERRER_HOSTS").unwrap_or_default());

        if let Some(path) = get("UI_REDIRECT_PATH") {
            if !path.starts_with('/') {
                bail!("UI_REDIRECT_PATH must be an absolute path, got '{path}'");
            }
            trial.ui_redirect_path = path;
        }

        trial.issue_rate_limit = rate_limit(
            parse("ISSUE_RATE_LIMIT_MAX", "5")?,
            parse("ISSUE_RATE_LIMIT_WINDOW_SECS", "3600")?,
            "ISSUE_RATE_LIMIT",
        )?;
        trial.start_rate_limit = rate_limit(
            parse("START_RATE_LIMIT_MAX", "20")?,
            parse("START_RATE_LIMIT_WINDOW_SECS", "600")?,
            "START_RATE_LIMIT",
        )?;

        if let Some(raw) = get("SESSION_COOKIE_SECURE") {
            trial.session_cookie.secure = parse_bool(&raw).context("SESSION_COOKIE_SECURE")?;
        }

        let port = u16::try_from(parse("PORT", "3001")?).context("PORT out of range")?;
        let database_max_connections = u32::try_from(parse("DATABASE_MAX_CONNECTIONS", "5")?)
            .context("DATABASE_MAX_CONNECTIONS out of range")?;

        Ok(Self {
            port,
            store: get("TRIAL_STORE")
                .unwrap_or_else(|| "postgres".into())
                .parse()
                .context("TRIAL_STORE")?,
            database_url: get("DATABASE_URL"),
            database_max_connections: database_max_connections.max(1),
            rate_limit_backend: get("RATE_LIMIT_BACKEND")
                .unwrap_or_else(|| "memory".into())
                .parse()
                .context("RATE_LIMIT_BACKEND")?,
            static_dir: PathBuf::from(get("STATIC_DIR").unwrap_or_else(|| "public".into())),
            trial,
        })
    }
}

fn rate_limit(max: u64, window_secs: u64, name: &str) -> anyhow::Result<RateLimitConfig> {
    let max = u32::try_from(max).with_context(|| format!("{name}_MAX out of range"))?;
    if max == 0 || window_secs == 0 {
        bail!("{name}_MAX and {name}_WINDOW_SECS must be positive");
    }
    Ok(RateLimitConfig::new(max, window_secs))
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
