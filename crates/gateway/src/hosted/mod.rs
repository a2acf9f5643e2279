//! Gateway to a hosted backend-as-a-service project.
//!
//! One [`HostedClient`] serves all three surfaces of a project: the row
//! API under `/rest/v1`, the auth API under `/auth/v1` and the realtime
//! WebSocket. The session obtained through [`AuthBackend`] methods
//! authorizes subsequent row requests and realtime joins.
//!
//! [`AuthBackend`]: crate::auth::AuthBackend

mod auth;
mod http;
mod rows;

use std::sync::{PoisonError, RwLock};

use keepmd_events::realtime::RealtimeClient;

use crate::auth::Session;

/// HTTP client for one hosted project.
pub struct HostedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    realtime: RealtimeClient,
    session: RwLock<Option<Session>>,
}

impl HostedClient {
    /// Create a client for the project at `base_url` using its public
    /// (anon) API key.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            realtime: RealtimeClient::new(&base_url, api_key.clone()),
            http,
            base_url,
            api_key,
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    /// The bearer token for requests: the session's access token, or
    /// the API key when signed out.
    fn bearer(&self) -> String {
        self.current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone())
    }

    /// Attach the `apikey` and bearer headers every endpoint expects.
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}
