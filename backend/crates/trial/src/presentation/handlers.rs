//! HTTP Handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use platform::client::{extract_client_ip, extract_referrer};
use platform::cookie::extract_cookie;
use platform::rate_limit::RateLimitStore;

use crate::application::advance_verification::AdvanceVerificationUseCase;
use crate::application::config::TrialConfig;
use crate::application::issue_credential::IssueCredentialUseCase;
use crate::application::start_verification::StartVerificationUseCase;
use crate::application::store::StoreHandle;
use crate::application::verify_token::VerifyTokenUseCase;
use crate::domain::repository::{CredentialHasher, VerificationRepository};
use crate::domain::value_objects::{ClientIdentity, SessionId};
use crate::error::{TrialError, TrialResult};
use crate::presentation::dto::{
    CallbackQuery, IssueRequest, IssueResponse, StartRequest, StartResponse, VerifyTokenRequest,
    VerifyTokenResponse,
};

/// Shared state for trial handlers
pub struct TrialAppState<R, H, L> {
    pub store: StoreHandle<R>,
    pub hasher: Arc<H>,
    pub rate_limiter: Arc<L>,
    pub config: Arc<TrialConfig>,
}

// Manual impl: derive would require `R: Clone` etc.
impl<R, H, L> Clone for TrialAppState<R, H, L> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hasher: Arc::clone(&self.hasher),
            rate_limiter: Arc::clone(&self.rate_limiter),
            config: Arc::clone(&self.config),
        }
    }
}

/// Session id carried by the session cookie; malformed values are ignored
fn cookie_session(headers: &HeaderMap, config: &TrialConfig) -> Option<SessionId> {
    extract_cookie(headers, &config.session_cookie.name).and_then(|raw| SessionId::parse(&raw))
}

fn client_identity(
    headers: &HeaderMap,
    addr: SocketAddr,
    session_id: Option<SessionId>,
) -> ClientIdentity {
    ClientIdentity::new(extract_client_ip(headers, Some(addr.ip())), session_id)
}

fn parse_session_id(raw: &str) -> TrialResult<SessionId> {
    SessionId::parse(raw).ok_or_else(|| TrialError::Validation("Invalid session_id".to_string()))
}

/// POST /verification/start
pub async fn start_verification<R, H, L>(
    State(state): State<TrialAppState<R, H, L>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> TrialResult<Response>
where
    R: VerificationRepository + Send + Sync + 'static,
    H: CredentialHasher + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    let Json(req) = payload?;

    let raw_plan = req
        .plan
        .ok_or_else(|| TrialError::Validation("Missing plan".to_string()))?;
    let session_id = match req.session_id.as_deref() {
        Some(raw) => Some(parse_session_id(raw)?),
        None => cookie_session(&headers, &state.config),
    };
    let identity = client_identity(&headers, addr, session_id);

    let use_case = StartVerificationUseCase::new(
        state.store.clone(),
        state.rate_limiter.clone(),
        state.config.clone(),
    );
    let output = use_case.execute(&identity, raw_plan).await?;

    let mut response = Json(StartResponse {
        success: true,
        token: output.token,
        plan: output.plan.get(),
        hours: output.trial_hours,
        expires_at: output.expires_at,
    })
    .into_response();

    // The funnel callback is a plain browser redirect; the cookie is how it
    // carries the session half of the identity.
    if let Some(sid) = &identity.session_id {
        let cookie = state.config.session_cookie.build_set_cookie(sid.as_str());
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

/// GET /verification/callback
///
/// Always a 302. A missing or unknown plan redirects with an error; whether
/// the record advanced is otherwise only visible in the logs.
pub async fn verification_callback<R, H, L>(
    State(state): State<TrialAppState<R, H, L>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Response
where
    R: VerificationRepository + Send + Sync + 'static,
    H: CredentialHasher + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    let plan = query
        .ok()
        .and_then(|Query(q)| q.plan_id())
        .and_then(|raw| state.config.plans.resolve(raw));

    let Some(plan) = plan else {
        return redirect(&state.config.redirect_location("error=missing_step"));
    };

    let identity = client_identity(&headers, addr, cookie_session(&headers, &state.config));
    let referrer = extract_referrer(&headers);

    let use_case = AdvanceVerificationUseCase::new(state.store.clone(), state.config.clone());
    if let Err(e) = use_case
        .execute(&identity, plan, referrer.as_deref())
        .await
    {
        tracing::error!(
            identity = %identity,
            plan = %plan,
            error = %e,
            "Callback failed, redirecting anyway"
        );
    }

    redirect(&state.config.redirect_location(&format!("verified={plan}")))
}

/// POST /credential/verify-token
pub async fn verify_token<R, H, L>(
    State(state): State<TrialAppState<R, H, L>>,
    headers: HeaderMap,
    payload: Result<Json<VerifyTokenRequest>, JsonRejection>,
) -> TrialResult<Json<VerifyTokenResponse>>
where
    R: VerificationRepository + Send + Sync + 'static,
    H: CredentialHasher + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    let Json(req) = payload?;

    let token = req
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TrialError::Validation("Missing token".to_string()))?;
    let session_id = match req.session_id.as_deref() {
        Some(raw) => Some(parse_session_id(raw)?),
        None => cookie_session(&headers, &state.config),
    };

    let use_case = VerifyTokenUseCase::new(state.store.clone());
    let output = use_case.execute(&token, session_id.as_ref()).await?;

    Ok(Json(VerifyTokenResponse {
        success: true,
        plan: output.plan.get(),
        step: output.plan.get(),
        status: output.status.as_str(),
        expires_at: output.expires_at,
    }))
}

/// POST /credential/issue
pub async fn issue_credential<R, H, L>(
    State(state): State<TrialAppState<R, H, L>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> TrialResult<Json<IssueResponse>>
where
    R: VerificationRepository + Send + Sync + 'static,
    H: CredentialHasher + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    let Json(req) = payload?;
    let identity = client_identity(&headers, addr, cookie_session(&headers, &state.config));

    let use_case = IssueCredentialUseCase::new(
        state.store.clone(),
        state.hasher.clone(),
        state.rate_limiter.clone(),
        state.config.clone(),
    );
    let credential = use_case.execute(&identity, req.plan).await?;

    Ok(Json(IssueResponse {
        success: true,
        username: credential.username,
        password: credential.password.expose().to_string(),
        hours: credential.hours,
        expires_at: credential.expires_at,
    }))
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => (StatusCode::FOUND, [(header::LOCATION, HeaderValue::from_static("/"))])
            .into_response(),
    }
}
