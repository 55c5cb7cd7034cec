//! Domain Value Objects
//!
//! Immutable value types for the trial verification domain.

use std::fmt;
use std::net::IpAddr;

use crate::domain::services::{host_matches, referrer_host};

/// Longest accepted client-supplied session id
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Plan identifier - the single key a verification is bound to
///
/// A plan maps to a trial duration through the configured plan catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanId(u32);

impl PlanId {
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-supplied session id (`[A-Za-z0-9_-]{1,128}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The (IP address, optional session id) pair a verification is bound to
///
/// Not unique per human, only per observed network path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub ip: Option<IpAddr>,
    pub session_id: Option<SessionId>,
}

impl ClientIdentity {
    pub fn new(ip: Option<IpAddr>, session_id: Option<SessionId>) -> Self {
        Self { ip, session_id }
    }

    /// IP as stored and logged; `unknown` when the origin could not be determined
    pub fn ip_string(&self) -> String {
        self.ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Lookup key persisted on each record
    pub fn key(&self) -> String {
        match &self.session_id {
            Some(sid) => format!("ip={};sid={}", self.ip_string(), sid.as_str()),
            None => format!("ip={}", self.ip_string()),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Why a callback did not advance a record
///
/// Logged, never serialized to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Allow-list enabled but the request carried no usable referrer
    ReferrerMissing,
    /// Referrer host is not on the allow-list
    ReferrerNotAllowed { host: String },
    /// No pending, unexpired record for this identity and plan
    NoPendingRecord,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::ReferrerMissing => "referrer_missing",
            RejectReason::ReferrerNotAllowed { .. } => "referrer_not_allowed",
            RejectReason::NoPendingRecord => "no_pending_record",
        }
    }
}

/// Hosts a funnel callback may be referred from
///
/// Empty list disables the check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferrerAllowList {
    hosts: Vec<String>,
}

impl ReferrerAllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    /// Parse a comma separated list (`gplinks.co, shrinkme.io`)
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn is_enabled(&self) -> bool {
        !self.hosts.is_empty()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Check an observed referrer
    ///
    /// Returns the matched referrer host, or `None` when the check is disabled.
    pub fn check(&self, referrer: Option<&str>) -> Result<Option<String>, RejectReason> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let host = referrer
            .and_then(referrer_host)
            .ok_or(RejectReason::ReferrerMissing)?;

        if self.hosts.iter().any(|allowed| host_matches(&host, allowed)) {
            Ok(Some(host))
        } else {
            Err(RejectReason::ReferrerNotAllowed { host })
        }
    }
}

/// SHA-256 digest of a verification token; the only form that is persisted
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 4 bytes are enough to correlate log lines
        write!(
            f,
            "TokenHash({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}
