//! Domain Entities
//!
//! Core business entities for the trial verification domain.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{TrialAccountId, VerificationRecordId};
use platform::password::{ClearTextPassword, HashedPassword};

use crate::domain::value_objects::{ClientIdentity, PlanId, TokenHash};

/// Verification lifecycle state
///
/// `pending -> completed -> used`. Expiry is a read-time predicate on
/// `expires_at`, never a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Completed,
    Used,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Completed => "completed",
            VerificationStatus::Used => "used",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "completed" => Some(VerificationStatus::Completed),
            "used" => Some(VerificationStatus::Used),
            _ => None,
        }
    }
}

/// Verification record - one attempt through the funnel
#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub id: VerificationRecordId,
    /// `ClientIdentity::key()` at creation
    pub identity: String,
    pub client_ip: String,
    pub session_id: Option<String>,
    pub plan: PlanId,
    /// Trial duration snapshotted from the plan catalog at creation
    pub trial_hours: u32,
    pub token_hash: TokenHash,
    pub status: VerificationStatus,
    /// Referrer observed by the callback that completed this record
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    /// Create a new pending record
    pub fn new(
        identity: &ClientIdentity,
        plan: PlanId,
        trial_hours: u32,
        token_hash: TokenHash,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VerificationRecordId::new(),
            identity: identity.key(),
            client_ip: identity.ip_string(),
            session_id: identity.session_id.as_ref().map(|s| s.as_str().to_string()),
            plan,
            trial_hours,
            token_hash,
            status: VerificationStatus::Pending,
            referrer: None,
            created_at: now,
            expires_at: now + ttl,
            completed_at: None,
            used_at: None,
        }
    }

    /// Expired once `now` reaches `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether a callback at `now` for (`identity`, `plan`) may complete this record
    pub fn can_complete(&self, identity: &str, plan: PlanId, now: DateTime<Utc>) -> bool {
        self.status == VerificationStatus::Pending
            && self.identity == identity
            && self.plan == plan
            && !self.is_expired_at(now)
    }

    /// Whether issuance at `now` for `identity` (optionally `plan`) may consume this record
    pub fn can_consume(&self, identity: &str, plan: Option<PlanId>, now: DateTime<Utc>) -> bool {
        self.status == VerificationStatus::Completed
            && self.identity == identity
            && plan.is_none_or(|p| self.plan == p)
            && !self.is_expired_at(now)
    }

    /// `pending -> completed`
    pub fn complete(&mut self, referrer: Option<String>, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, VerificationStatus::Pending);
        self.status = VerificationStatus::Completed;
        self.completed_at = Some(now);
        self.referrer = referrer;
    }

    /// `completed -> used`
    pub fn consume(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.status, VerificationStatus::Completed);
        self.status = VerificationStatus::Used;
        self.used_at = Some(now);
    }

    pub fn trial_duration(&self) -> Duration {
        Duration::hours(i64::from(self.trial_hours))
    }
}

/// Everything needed to provision an account, prepared before any state changes
#[derive(Debug)]
pub struct CredentialDraft {
    pub username: String,
    pub password_hash: HashedPassword,
    pub client_ip: String,
}

/// Trial account row; never holds the clear text password
#[derive(Debug, Clone)]
pub struct TrialAccount {
    pub id: TrialAccountId,
    pub username: String,
    pub password_hash: HashedPassword,
    pub trial_hours: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub notes: String,
    pub verification_id: VerificationRecordId,
}

impl TrialAccount {
    /// Provision an account for a consumed record
    ///
    /// Lifetime comes from the record, not from the issuance request.
    pub fn for_record(draft: &CredentialDraft, record: &VerificationRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: TrialAccountId::new(),
            username: draft.username.clone(),
            password_hash: draft.password_hash.clone(),
            trial_hours: record.trial_hours,
            expires_at: now + record.trial_duration(),
            created_at: now,
            notes: format!("Trial {}h from IP: {}", record.trial_hours, draft.client_ip),
            verification_id: record.id,
        }
    }
}

/// Credential handed to the caller exactly once
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    pub password: ClearTextPassword,
    pub hours: u32,
    pub expires_at: DateTime<Utc>,
}
