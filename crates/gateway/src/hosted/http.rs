//! Response helpers shared by the row and auth endpoints.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{extract_message, GatewayError, GatewayResult};

/// Ensure the response has a success status code.
///
/// Non-2xx responses are mapped by status: 401/403 to `Unauthorized`,
/// 404 to `NotFound`, 409 to `Conflict`, anything else to `Api`.
pub(crate) async fn ensure_success(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(status_error(status, body))
}

/// Parse a successful JSON response body into `T`.
pub(crate) async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Check the status and discard the body.
pub(crate) async fn check_status(response: reqwest::Response) -> GatewayResult<()> {
    ensure_success(response).await.map(|_| ())
}

pub(crate) fn status_error(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::Unauthorized(message_or_body(body))
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound(message_or_body(body)),
        StatusCode::CONFLICT => GatewayError::Conflict(message_or_body(body)),
        _ => GatewayError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

fn message_or_body(body: String) -> String {
    extract_message(&body).unwrap_or(body)
}
