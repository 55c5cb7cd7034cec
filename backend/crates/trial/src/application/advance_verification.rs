//! Advance Verification Use Case
//!
//! Driven by the funnel callback. The outcome is logged and never reaches
//! the client: the callback answers with the same redirect either way.

use std::sync::Arc;

use chrono::Utc;
use kernel::id::VerificationRecordId;

use crate::application::config::TrialConfig;
use crate::application::store::StoreHandle;
use crate::domain::repository::VerificationRepository;
use crate::domain::value_objects::{ClientIdentity, PlanId, RejectReason};
use crate::error::TrialResult;

/// Longest referrer persisted on a record
const MAX_STORED_REFERRER_LEN: usize = 512;

/// Internal result of a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced { record_id: VerificationRecordId },
    Rejected(RejectReason),
}

impl AdvanceOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, AdvanceOutcome::Advanced { .. })
    }
}

/// Advance Verification Use Case
pub struct AdvanceVerificationUseCase<R>
where
    R: VerificationRepository,
{
    store: StoreHandle<R>,
    config: Arc<TrialConfig>,
}

impl<R> AdvanceVerificationUseCase<R>
where
    R: VerificationRepository,
{
    pub fn new(store: StoreHandle<R>, config: Arc<TrialConfig>) -> Self {
        Self { store, config }
    }

    pub async fn execute(
        &self,
        identity: &ClientIdentity,
        plan: PlanId,
        referrer: Option<&str>,
    ) -> TrialResult<AdvanceOutcome> {
        if let Err(reason) = self.config.allowed_referrers.check(referrer) {
            tracing::warn!(
                identity = %identity,
                plan = %plan,
                reason = reason.as_str(),
                referrer = ?reason_host(&reason),
                "Callback rejected"
            );
            return Ok(AdvanceOutcome::Rejected(reason));
        }

        let repo = self.store.get()?;
        let stored_referrer = referrer.map(truncate_referrer);

        let completed = repo
            .complete_latest_pending(&identity.key(), plan, stored_referrer, Utc::now())
            .await?;

        match completed {
            Some(record) => {
                tracing::info!(
                    record_id = %record.id,
                    identity = %identity,
                    plan = %plan,
                    "Verification completed"
                );
                Ok(AdvanceOutcome::Advanced {
                    record_id: record.id,
                })
            }
            None => {
                tracing::warn!(
                    identity = %identity,
                    plan = %plan,
                    reason = RejectReason::NoPendingRecord.as_str(),
                    "Callback rejected"
                );
                Ok(AdvanceOutcome::Rejected(RejectReason::NoPendingRecord))
            }
        }
    }
}

fn reason_host(reason: &RejectReason) -> Option<&str> {
    match reason {
        RejectReason::ReferrerNotAllowed { host } => Some(host),
        _ => None,
    }
}

fn truncate_referrer(referrer: &str) -> &str {
    if referrer.len() <= MAX_STORED_REFERRER_LEN {
        return referrer;
    }
    let mut end = MAX_STORED_REFERRER_LEN;
    while !referrer.is_char_boundary(end) {
        end -= 1;
    }
    &referrer[..end]
}
