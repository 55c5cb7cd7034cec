//! Trial Router

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use platform::rate_limit::RateLimitStore;

use crate::application::config::TrialConfig;
use crate::application::store::StoreHandle;
use crate::domain::repository::{CredentialHasher, VerificationRepository};
use crate::infra::hasher::Argon2Hasher;
use crate::infra::rate_limit::RateLimiterBackend;
use crate::presentation::handlers::{self, TrialAppState};

/// Create the trial router with the Argon2 hasher
///
/// Meant to be nested under `/api`.
pub fn trial_router<R>(
    store: StoreHandle<R>,
    rate_limiter: RateLimiterBackend,
    config: TrialConfig,
) -> Router
where
    R: VerificationRepository + Send + Sync + 'static,
{
    trial_router_generic(TrialAppState {
        store,
        hasher: Arc::new(Argon2Hasher),
        rate_limiter: Arc::new(rate_limiter),
        config: Arc::new(config),
    })
}

/// Create a trial router for any store, hasher and limiter
pub fn trial_router_generic<R, H, L>(state: TrialAppState<R, H, L>) -> Router
where
    R: VerificationRepository + Send + Sync + 'static,
    H: CredentialHasher + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/verification/start",
            post(handlers::start_verification::<R, H, L>),
        )
        .route(
            "/verification/callback",
            get(handlers::verification_callback::<R, H, L>),
        )
        .route(
            "/credential/verify-token",
            post(handlers::verify_token::<R, H, L>),
        )
        .route(
            "/credential/issue",
            post(handlers::issue_credential::<R, H, L>),
        )
        // Paths of the earlier deployment
        .route("/start", post(handlers::start_verification::<R, H, L>))
        .route(
            "/start-verification",
            post(handlers::start_verification::<R, H, L>),
        )
        .route("/callback", get(handlers::verification_callback::<R, H, L>))
        .route("/verify-token", post(handlers::verify_token::<R, H, L>))
        .route("/generate", post(handlers::issue_credential::<R, H, L>))
        .with_state(state)
}
