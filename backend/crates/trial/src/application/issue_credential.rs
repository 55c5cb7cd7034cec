//! Issue Credential Use Case

use std::sync::Arc;

use chrono::Utc;
use platform::password::ClearTextPassword;
use platform::rate_limit::RateLimitStore;

use crate::application::config::TrialConfig;
use crate::application::rate_limit::enforce;
use crate::application::store::StoreHandle;
use crate::domain::entities::{Credential, CredentialDraft};
use crate::domain::repository::{CredentialHasher, VerificationRepository};
use crate::domain::services::generate_username;
use crate::domain::value_objects::ClientIdentity;
use crate::error::{TrialError, TrialResult};

/// Issue Credential Use Case
///
/// Callers without a completed record are turned away before any hashing.
/// The credential is built and hashed before any state changes; the record
/// is then consumed and the account written as one unit. A failure at any
/// point leaves the record `completed` and no account behind.
pub struct IssueCredentialUseCase<R, H, L>
where
    R: VerificationRepository,
    H: CredentialHasher,
    L: RateLimitStore,
{
    store: StoreHandle<R>,
    hasher: Arc<H>,
    rate_limiter: Arc<L>,
    config: Arc<TrialConfig>,
}

impl<R, H, L> IssueCredentialUseCase<R, H, L>
where
    R: VerificationRepository,
    H: CredentialHasher,
    L: RateLimitStore,
{
    pub fn new(
        store: StoreHandle<R>,
        hasher: Arc<H>,
        rate_limiter: Arc<L>,
        config: Arc<TrialConfig>,
    ) -> Self {
        Self {
            store,
            hasher,
            rate_limiter,
            config,
        }
    }

    /// `requested_plan` narrows which completed record may be consumed; it
    /// never sets the credential lifetime
    pub async fn execute(
        &self,
        identity: &ClientIdentity,
        requested_plan: Option<u32>,
    ) -> TrialResult<Credential> {
        let key = format!("gen:{}", identity.ip_string());
        enforce(
            self.rate_limiter.as_ref(),
            &key,
            &self.config.issue_rate_limit,
        )
        .await?;

        let plan = requested_plan
            .map(|raw| {
                self.config
                    .plans
                    .resolve(raw)
                    .ok_or_else(|| TrialError::Validation(format!("Unknown plan: {raw}")))
            })
            .transpose()?;

        let repo = self.store.get()?;
        let identity_key = identity.key();

        if !repo.has_consumable(&identity_key, plan, Utc::now()).await? {
            return Err(TrialError::NotVerified);
        }

        let password = ClearTextPassword::generate(self.config.password_length);
        let password_hash = self.hasher.hash(&password).await?;

        // Expiry and lifetime are judged after hashing.
        let now = Utc::now();
        let draft = CredentialDraft {
            username: generate_username(now),
            password_hash,
            client_ip: identity.ip_string(),
        };

        let (record, account) = repo
            .consume_for_issuance(&identity_key, plan, &draft, now)
            .await?
            .ok_or(TrialError::NotVerified)?;

        tracing::info!(
            record_id = %record.id,
            account_id = %account.id,
            identity = %identity,
            plan = %record.plan,
            hours = account.trial_hours,
            username = %account.username,
            "Trial credential issued"
        );

        Ok(Credential {
            username: account.username,
            password,
            hours: account.trial_hours,
            expires_at: account.expires_at,
        })
    }
}
