//! Repository Traits
//!
//! Interfaces for data persistence and credential hashing. Implementations
//! live in the infrastructure layer.

use chrono::{DateTime, Utc};
use platform::password::{ClearTextPassword, HashedPassword};

use crate::domain::entities::{CredentialDraft, TrialAccount, VerificationRecord};
use crate::domain::value_objects::{PlanId, TokenHash};
use crate::error::TrialResult;

/// Verification record store
///
/// Both transitions are conditional: a record only moves if its status is
/// still the expected one when the write lands, so racing callers observe
/// exactly one success.
#[trait_variant::make(VerificationRepository: Send)]
pub trait LocalVerificationRepository {
    /// Persist a new pending record
    async fn create(&self, record: &VerificationRecord) -> TrialResult<()>;

    /// Find a record by the digest of its token
    async fn find_by_token_hash(&self, hash: &TokenHash) -> TrialResult<Option<VerificationRecord>>;

    /// Complete the newest unexpired pending record for `identity` and `plan`
    ///
    /// Returns the completed record, or `None` if nothing matched.
    async fn complete_latest_pending(
        &self,
        identity: &str,
        plan: PlanId,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<VerificationRecord>>;

    /// Whether an unexpired completed record exists for `identity`
    ///
    /// Read-only pre-check; `consume_for_issuance` stays authoritative.
    async fn has_consumable(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        now: DateTime<Utc>,
    ) -> TrialResult<bool>;

    /// Consume the newest unexpired completed record for `identity` and
    /// persist the trial account built from `draft`, as one unit
    ///
    /// Returns `None` (and writes nothing) if no record matched.
    async fn consume_for_issuance(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        draft: &CredentialDraft,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<(VerificationRecord, TrialAccount)>>;
}

/// One-way password hashing capability
#[trait_variant::make(CredentialHasher: Send)]
pub trait LocalCredentialHasher {
    async fn hash(&self, password: &ClearTextPassword) -> TrialResult<HashedPassword>;
}
