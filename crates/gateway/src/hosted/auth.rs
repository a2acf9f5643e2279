//! [`AuthBackend`] over the hosted auth API.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{check_status, ensure_success, parse_response};
use super::HostedClient;
use crate::auth::{AuthBackend, AuthUser, OtpKind, Session, SignUpOutcome};
use crate::error::{GatewayError, GatewayResult};

/// Session payload returned by the token, verify and signup endpoints.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl From<SessionResponse> for Session {
    fn from(r: SessionResponse) -> Self {
        Session {
            expires_at: r
                .expires_at
                .unwrap_or_else(|| Utc::now().timestamp() + r.expires_in),
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            token_type: r.token_type,
            user: r.user,
        }
    }
}

/// Sign-up answers with a session when confirmation is disabled and
/// with the bare user otherwise.
pub(crate) fn decode_sign_up(body: Value) -> Result<SignUpOutcome, serde_json::Error> {
    if body.get("access_token").is_some() {
        let session: SessionResponse = serde_json::from_value(body)?;
        return Ok(SignUpOutcome::SignedIn(session.into()));
    }
    let user = match body.get("user") {
        Some(user) => serde_json::from_value(user.clone())?,
        None => serde_json::from_value(body)?,
    };
    Ok(SignUpOutcome::ConfirmationSent(user))
}

impl HostedClient {
    async fn post_for_session(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Value,
    ) -> GatewayResult<Session> {
        let response = self
            .authorized(self.http.post(self.auth_url(path)))
            .query(query)
            .json(&body)
            .send()
            .await?;

        let session: Session = parse_response::<SessionResponse>(response).await?.into();
        self.store_session(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl AuthBackend for HostedClient {
    async fn get_session(&self) -> GatewayResult<Option<Session>> {
        match self.current_session() {
            Some(session) if session.is_expired() => self.refresh_session().await.map(Some),
            other => Ok(other),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session> {
        let session = self
            .post_for_session(
                "token",
                &[("grant_type", "password")],
                json!({ "email": email, "password": password }),
            )
            .await?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> GatewayResult<SignUpOutcome> {
        let response = self
            .authorized(self.http.post(self.auth_url("signup")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let body: Value = parse_response(response).await?;
        let outcome = decode_sign_up(body)?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            self.store_session(Some(session.clone()));
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        let response = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        // The local session ends even if the server call fails.
        self.store_session(None);

        match ensure_success(response?).await {
            Ok(_) | Err(GatewayError::Unauthorized(_)) | Err(GatewayError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> GatewayResult<()> {
        let response = self
            .authorized(self.http.post(self.auth_url("recover")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }))
            .send()
            .await?;

        check_status(response).await
    }

    async fn update_password(&self, new_password: &str) -> GatewayResult<AuthUser> {
        if self.current_session().is_none() {
            return Err(GatewayError::Unauthorized("Auth session missing!".into()));
        }
        let response = self
            .authorized(self.http.put(self.auth_url("user")))
            .json(&json!({ "password": new_password }))
            .send()
            .await?;

        parse_response(response).await
    }

    async fn verify_otp(&self, token_hash: &str, kind: OtpKind) -> GatewayResult<Session> {
        self.post_for_session(
            "verify",
            &[],
            json!({ "type": kind.as_str(), "token_hash": token_hash }),
        )
        .await
    }

    async fn refresh_session(&self) -> GatewayResult<Session> {
        let refresh_token = self
            .current_session()
            .map(|s| s.refresh_token)
            .ok_or_else(|| GatewayError::Unauthorized("Auth session missing!".into()))?;

        let result = self
            .post_for_session(
                "token",
                &[("grant_type", "refresh_token")],
                json!({ "refresh_token": refresh_token }),
            )
            .await;
        if let Err(GatewayError::Unauthorized(_)) = &result {
            self.store_session(None);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user_json() -> Value {
        json!({
            "id": "5d1c0d5e-8f43-4a53-9a43-44c0b7d1e002",
            "email": "a@example.com",
            "email_confirmed_at": null
        })
    }

    #[test]
    fn sign_up_with_session() {
        let body = json!({
            "access_token": "at",
            "refresh_token": "rt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": user_json()
        });
        assert_matches!(
            decode_sign_up(body).unwrap(),
            SignUpOutcome::SignedIn(s) if s.access_token == "at" && s.expires_at == 1_900_000_000
        );
    }

    #[test]
    fn sign_up_pending_confirmation() {
        assert_matches!(
            decode_sign_up(user_json()).unwrap(),
            SignUpOutcome::ConfirmationSent(u) if u.email == "a@example.com"
        );
        assert_matches!(
            decode_sign_up(json!({ "user": user_json() })).unwrap(),
            SignUpOutcome::ConfirmationSent(_)
        );
    }

    #[test]
    fn session_without_expires_at_uses_expires_in() {
        let response: SessionResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 60,
            "user": user_json()
        }))
        .unwrap();
        let session: Session = response.into();
        assert!(!session.is_expired());
        assert_eq!(session.token_type, "bearer");
    }
}
