//! Verify Token Use Case
//!
//! Read-only status check for a token returned by `start`.

use chrono::{DateTime, Utc};

use crate::application::store::StoreHandle;
use crate::domain::entities::VerificationStatus;
use crate::domain::repository::VerificationRepository;
use crate::domain::services::hash_token;
use crate::domain::value_objects::{PlanId, SessionId};
use crate::error::{TrialError, TrialResult};

/// Output DTO for verify token
#[derive(Debug, Clone)]
pub struct VerifyTokenOutput {
    pub plan: PlanId,
    pub status: VerificationStatus,
    pub expires_at: DateTime<Utc>,
}

/// Verify Token Use Case
pub struct VerifyTokenUseCase<R>
where
    R: VerificationRepository,
{
    store: StoreHandle<R>,
}

impl<R> VerifyTokenUseCase<R>
where
    R: VerificationRepository,
{
    pub fn new(store: StoreHandle<R>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        token: &str,
        session_id: Option<&SessionId>,
    ) -> TrialResult<VerifyTokenOutput> {
        if token.is_empty() {
            return Err(TrialError::Validation("Missing token".to_string()));
        }

        let repo = self.store.get()?;
        let hash = hash_token(token);

        let record = repo
            .find_by_token_hash(&hash)
            .await?
            .ok_or(TrialError::InvalidToken)?;

        if record.session_id.as_deref() != session_id.map(SessionId::as_str) {
            tracing::debug!(token_hash = ?hash, "Token presented from another session");
            return Err(TrialError::InvalidToken);
        }

        if record.status == VerificationStatus::Used {
            return Err(TrialError::TokenUsed);
        }
        if record.is_expired_at(Utc::now()) {
            return Err(TrialError::TokenExpired);
        }

        Ok(VerifyTokenOutput {
            plan: record.plan,
            status: record.status,
            expires_at: record.expires_at,
        })
    }
}
