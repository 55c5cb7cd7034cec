//! Start Verification Use Case

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kernel::id::VerificationRecordId;
use platform::rate_limit::RateLimitStore;

use crate::application::config::TrialConfig;
use crate::application::rate_limit::enforce;
use crate::application::store::StoreHandle;
use crate::domain::entities::VerificationRecord;
use crate::domain::repository::VerificationRepository;
use crate::domain::services::issue_token;
use crate::domain::value_objects::{ClientIdentity, PlanId};
use crate::error::{TrialError, TrialResult};

/// Output DTO for start verification
#[derive(Debug, Clone)]
pub struct StartVerificationOutput {
    pub record_id: VerificationRecordId,
    /// Plaintext token; returned once, only its digest is stored
    pub token: String,
    pub plan: PlanId,
    pub trial_hours: u32,
    pub expires_at: DateTime<Utc>,
}

/// Start Verification Use Case
///
/// Always writes a new pending record. Earlier pending records for the same
/// identity and plan are left alone; the newest one wins on lookup.
pub struct StartVerificationUseCase<R, L>
where
    R: VerificationRepository,
    L: RateLimitStore,
{
    store: StoreHandle<R>,
    rate_limiter: Arc<L>,
    config: Arc<TrialConfig>,
}

impl<R, L> StartVerificationUseCase<R, L>
where
    R: VerificationRepository,
    L: RateLimitStore,
{
    pub fn new(store: StoreHandle<R>, rate_limiter: Arc<L>, config: Arc<TrialConfig>) -> Self {
        Self {
            store,
            rate_limiter,
            config,
        }
    }

    pub async fn execute(
        &self,
        identity: &ClientIdentity,
        raw_plan: u32,
    ) -> TrialResult<StartVerificationOutput> {
        let plan = self
            .config
            .plans
            .resolve(raw_plan)
            .ok_or_else(|| TrialError::Validation(format!("Unknown plan: {raw_plan}")))?;
        let trial_hours = self
            .config
            .plans
            .hours_for(plan)
            .ok_or_else(|| TrialError::Internal(format!("plan {plan} has no duration")))?;

        let key = format!("start:{}", identity.ip_string());
        enforce(
            self.rate_limiter.as_ref(),
            &key,
            &self.config.start_rate_limit,
        )
        .await?;

        let repo = self.store.get()?;

        let (token, token_hash) = issue_token();
        let record = VerificationRecord::new(
            identity,
            plan,
            trial_hours,
            token_hash,
            self.config.pending_ttl_chrono(),
        );

        repo.create(&record).await?;

        tracing::info!(
            record_id = %record.id,
            identity = %identity,
            plan = %plan,
            expires_at = %record.expires_at,
            "Verification started"
        );

        Ok(StartVerificationOutput {
            record_id: record.id,
            token,
            plan,
            trial_hours,
            expires_at: record.expires_at,
        })
    }
}
