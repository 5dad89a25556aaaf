//! Session handling for the HRMS API.
//!
//! [`SessionAuth`] is a middleware that authorizes requests with the stored access token and,
//! when the API answers 401, renews the token once and replays every request that was waiting
//! on it. [`SessionFlow`] logs users in and out and restores a stored session on startup.
use std::sync::Arc;

pub use middleware::SessionAuth;
pub use navigator::{Navigator, NoopNavigator};
pub use refresh::{LoginResponse, RefreshResponse};
pub use store::{Credential, CredentialStore, FileStore, MemoryStore};
use tracing::{debug, info, warn};

use crate::response::InMemoryResponseExt;
use crate::{Client, InMemoryResult};
use refresh::{LoginRequest, RefreshRequest};

mod middleware;
mod navigator;
mod refresh;
mod store;

/// Endpoints and locations used by the session middleware and flow.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Exchanges `{"refresh"}` for `{"access"}`.
    pub refresh_endpoint: String,
    /// A 401 from a path containing this never triggers a refresh.
    pub login_endpoint: String,
    pub logout_endpoint: String,
    /// The application's login screen. No redirect happens while already there.
    pub login_location: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_endpoint: "/auth/refresh/".to_string(),
            login_endpoint: "/auth/login/".to_string(),
            logout_endpoint: "/auth/logout/".to_string(),
            login_location: "/login".to_string(),
        }
    }
}

/// Logs users in and out, and restores stored sessions.
#[derive(Debug, Clone)]
pub struct SessionFlow {
    pub config: SessionConfig,
    pub store: Arc<dyn CredentialStore>,
}

impl SessionFlow {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            config: SessionConfig::default(),
            store,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Exchange username and password for tokens, and store them with the user profile.
    /// On failure the store is left untouched; `Error::detail` has the backend's message.
    pub async fn login(&self, client: &Client, username: &str, password: &str) -> InMemoryResult<LoginResponse> {
        let res = client
            .post(&self.config.login_endpoint)
            .set_json(LoginRequest { username, password })
            .send_awaiting_body()
            .await?;
        let data: LoginResponse = res.json()?;
        self.store.save(Credential::new(data.access.clone(), data.refresh.clone(), Some(data.user.clone())))?;
        info!(user = %data.user.get("username").and_then(|u| u.as_str()).unwrap_or("?"), "logged in");
        Ok(data)
    }

    /// Tell the backend we're leaving, then drop the stored session. The backend is stateless, so the
    /// session is cleared even when that call fails. The call's error, if any, is returned.
    pub async fn logout(&self, client: &Client) -> InMemoryResult<()> {
        let refresh_token = self.store.refresh_token();
        let mut req = client.post(&self.config.logout_endpoint);
        if let Some(refresh) = refresh_token.as_deref() {
            req = req.set_json(RefreshRequest { refresh });
        }
        let res = req.send_awaiting_body().await;
        if let Err(e) = &res {
            warn!(error = %e, "logout call failed");
        }
        self.store.clear()?;
        info!("logged out");
        res.map(|_| ())
    }

    /// The stored session, if it is complete. A partial session (e.g. a token without a profile)
    /// is not restored, but stays in the store until the next login or logout.
    pub fn restore(&self) -> Option<Credential> {
        let credential = self.store.load();
        if credential.is_complete() {
            debug!("restored stored session");
            return Some(credential);
        }
        if !credential.is_empty() {
            debug!("stored session is incomplete, not restoring");
        }
        None
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }

    pub fn user(&self) -> Option<serde_json::Value> {
        self.store.profile()
    }
}
