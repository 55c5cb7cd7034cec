//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Request for POST /verification/start
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default, alias = "step", deserialize_with = "lenient_plan")]
    pub plan: Option<u32>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Response for POST /verification/start
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub token: String,
    pub plan: u32,
    pub hours: u32,
    pub expires_at: DateTime<Utc>,
}

/// Query for GET /verification/callback
///
/// Kept as text: a malformed value still gets the uniform redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default, alias = "step")]
    pub plan: Option<String>,
}

impl CallbackQuery {
    pub fn plan_id(&self) -> Option<u32> {
        self.plan.as_deref()?.trim().parse().ok()
    }
}

/// Request for POST /credential/verify-token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Response for POST /credential/verify-token
#[derive(Debug, Clone, Serialize)]
pub struct VerifyTokenResponse {
    pub success: bool,
    pub plan: u32,
    /// Same value as `plan`, for clients that still say "step"
    pub step: u32,
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Request for POST /credential/issue
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueRequest {
    #[serde(default, alias = "hours", deserialize_with = "lenient_plan")]
    pub plan: Option<u32>,
}

/// Response for POST /credential/issue
///
/// The only place the clear text password ever leaves the process.
#[derive(Serialize)]
pub struct IssueResponse {
    pub success: bool,
    pub username: String,
    pub password: String,
    pub hours: u32,
    pub expires_at: DateTime<Utc>,
}

/// Accept `1` as well as `"1"`
fn lenient_plan<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => u32::try_from(n)
            .map(Some)
            .map_err(|_| D::Error::custom("plan out of range")),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| D::Error::custom("plan must be a positive integer")),
    }
}
