use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the refresh call.
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response when exchanging a refresh token for a new access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Only present when the backend rotates refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Response of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
    pub user: Value,
}
