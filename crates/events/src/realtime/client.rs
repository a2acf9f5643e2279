//! WebSocket client for the hosted realtime service.
//!
//! [`RealtimeClient`] holds the connection configuration. Call
//! [`RealtimeClient::connect`] to establish a live [`RealtimeConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Protocol version requested in the connection URL.
const PROTOCOL_VSN: &str = "1.0.0";

/// Path of the realtime WebSocket endpoint relative to the project URL.
const REALTIME_PATH: &str = "/realtime/v1/websocket";

/// Raw WebSocket stream type used by realtime sessions.
pub type RealtimeStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    ws_url: String,
    api_key: String,
}

/// A live WebSocket connection to the realtime service.
pub struct RealtimeConnection {
    pub ws_stream: RealtimeStream,
}

impl RealtimeClient {
    /// Create a client for the project at `project_url`
    /// (e.g. `https://abc.example.co`).
    ///
    /// `http(s)` schemes are rewritten to `ws(s)`.
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Self {
        let base = project_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Self {
            ws_url: format!("{ws_base}{REALTIME_PATH}"),
            api_key: api_key.into(),
        }
    }

    /// WebSocket endpoint without query parameters.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full connection URL including the api key and protocol version.
    pub fn connect_url(&self) -> String {
        format!(
            "{}?apikey={}&vsn={PROTOCOL_VSN}",
            self.ws_url, self.api_key
        )
    }

    pub async fn connect(&self) -> Result<RealtimeConnection, RealtimeError> {
        let (ws_stream, _response) = connect_async(self.connect_url()).await.map_err(|e| {
            RealtimeError::Connection(format!(
                "Failed to connect to realtime at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(url = %self.ws_url, "Connected to realtime service");

        Ok(RealtimeConnection { ws_stream })
    }
}

/// Errors that can occur on the realtime connection.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_becomes_wss() {
        let client = RealtimeClient::new("https://abc.example.co/", "key");
        assert_eq!(client.ws_url(), "wss://abc.example.co/realtime/v1/websocket");
        assert_eq!(
            client.connect_url(),
            "wss://abc.example.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
    }

    #[test]
    fn http_becomes_ws() {
        let client = RealtimeClient::new("http://localhost:54321", "k");
        assert_eq!(client.ws_url(), "ws://localhost:54321/realtime/v1/websocket");
    }
}
