use keepmd_events::realtime::RealtimeError;

/// Errors returned by a backend gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status not covered below.
    #[error("Backend API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing session, bad credentials, or an expired/invalid token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    /// Failure injected by a test backend.
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Convenience alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// The message to show a user, without the variant prefix.
    ///
    /// For `Api` errors the backend usually sends a JSON body with a
    /// `msg`, `message` or `error_description` field; that text is
    /// preferred over the raw body.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Api { body, .. } => extract_message(body).unwrap_or_else(|| body.clone()),
            GatewayError::NotFound(msg)
            | GatewayError::Conflict(msg)
            | GatewayError::Unauthorized(msg)
            | GatewayError::Injected(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Pull a human-readable message out of a JSON error body.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
