use std::env;

use tracing::debug;

use crate::Client;

pub const BASE_URL_ENV: &str = "HRMS_API_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Where the HRMS API lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }

    /// Reads `HRMS_API_BASE_URL`. Unset or blank falls back to the local development server.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(BASE_URL_ENV).map(|s| s.trim().to_string()) {
            Some(base_url) if !base_url.is_empty() => {
                debug!(%base_url, "using API base url from environment");
                Self { base_url }
            }
            _ => Self::default(),
        }
    }

    /// A client for the API, sending and accepting JSON. Add middlewares such as
    /// [`SessionAuth`](crate::session::SessionAuth) to it before use.
    pub fn client(&self) -> Client {
        Client::new()
            .base_url(&self.base_url)
            .default_header("Content-Type", "application/json")
            .default_header("Accept", "application/json")
    }
}
