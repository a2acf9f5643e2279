//! The signed-in user and the account flows around it.
//!
//! [`AuthSession`] wraps an [`AuthBackend`] with the input checks the
//! forms perform before a request goes out, and reports every outcome
//! on the shared [`Notices`] channel as well as through its return
//! value.

use std::sync::Arc;

use keepmd_core::error::CoreError;
use keepmd_core::validation::{validate_email, validate_password_pair};
use keepmd_gateway::{AuthBackend, AuthUser, GatewayError, OtpKind, Session, SignUpOutcome};
use tokio::sync::watch;

use crate::notice::Notices;

/// Path the confirmation link in a sign-up e-mail points at.
pub const CONFIRM_EMAIL_PATH: &str = "/confirm-email";

/// Path the link in a password-recovery e-mail points at.
pub const RESET_PASSWORD_PATH: &str = "/reset-password";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Input rejected before any request was made.
    #[error("{0}")]
    Validation(String),

    /// The backend refused the request (bad credentials, expired link,
    /// duplicate account).
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached or answered unexpectedly.
    #[error(transparent)]
    Gateway(GatewayError),
}

impl From<CoreError> for AuthError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => AuthError::Validation(msg),
            other => AuthError::Validation(other.to_string()),
        }
    }
}

impl From<GatewayError> for AuthError {
    fn from(e: GatewayError) -> Self {
        match &e {
            GatewayError::Unauthorized(_)
            | GatewayError::Conflict(_)
            | GatewayError::NotFound(_) => AuthError::Rejected(e.user_message()),
            GatewayError::Api { status, .. } if (400..500).contains(status) => {
                AuthError::Rejected(e.user_message())
            }
            _ => AuthError::Gateway(e),
        }
    }
}

impl AuthError {
    /// Text for the error notice.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(msg) | AuthError::Rejected(msg) => msg.clone(),
            AuthError::Gateway(e) => e.user_message(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Current user identity and session lifecycle.
#[derive(Clone)]
pub struct AuthSession {
    backend: Arc<dyn AuthBackend>,
    user: Arc<watch::Sender<Option<AuthUser>>>,
    notices: Notices,
    redirect_url: String,
}

impl AuthSession {
    /// `redirect_url` is the application origin e-mail links return to.
    pub fn new(backend: Arc<dyn AuthBackend>, notices: Notices, redirect_url: impl Into<String>) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            backend,
            user: Arc::new(user),
            notices,
            redirect_url: redirect_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.borrow().clone()
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Pick up an existing session, if the backend still has one.
    pub async fn restore(&self) -> Option<AuthUser> {
        match self.backend.get_session().await {
            Ok(session) => {
                let user = session.map(|s| s.user);
                self.user.send_replace(user.clone());
                user
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not restore session");
                self.user.send_replace(None);
                None
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        let result = async {
            validate_email(email)?;
            let session = self.backend.sign_in_with_password(email.trim(), password).await?;
            Ok::<_, AuthError>(session.user)
        }
        .await;

        let user = self.report(result, None)?;
        tracing::info!(user_id = %user.id, "Signed in");
        self.user.send_replace(Some(user.clone()));
        Ok(user)
    }

    /// Register an account. When e-mail confirmation is required the
    /// user stays signed out until the link is followed.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirmation: &str,
    ) -> AuthResult<SignUpOutcome> {
        let redirect_to = self.link(CONFIRM_EMAIL_PATH);
        let result = async {
            validate_email(email)?;
            validate_password_pair(password, confirmation)?;
            Ok::<_, AuthError>(self.backend.sign_up(email.trim(), password, &redirect_to).await?)
        }
        .await;

        let outcome = self.report(result, None)?;
        match &outcome {
            SignUpOutcome::SignedIn(session) => {
                self.user.send_replace(Some(session.user.clone()));
                self.notices.success("Account created");
            }
            SignUpOutcome::ConfirmationSent(user) => {
                tracing::info!(user_id = %user.id, "Awaiting e-mail confirmation");
                self.notices
                    .success("Check your email for the confirmation link");
            }
        }
        Ok(outcome)
    }

    /// End the session. The local user is cleared even when the backend
    /// call fails.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let result = self.backend.sign_out().await.map_err(AuthError::from);
        self.user.send_replace(None);
        self.report(result, None)?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Send a recovery link to `email`.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let redirect_to = self.link(RESET_PASSWORD_PATH);
        let result = async {
            validate_email(email)?;
            Ok::<_, AuthError>(self
                .backend
                .reset_password_for_email(email.trim(), &redirect_to)
                .await?)
        }
        .await;

        self.report(result, Some("Password reset link sent"))
    }

    /// Change the signed-in user's password.
    pub async fn update_password(&self, password: &str, confirmation: &str) -> AuthResult<()> {
        let result = async {
            validate_password_pair(password, confirmation)?;
            Ok::<_, AuthError>(self.backend.update_password(password).await?)
        }
        .await;

        let user = self.report(result, Some("Password updated"))?;
        self.user.send_replace(Some(user));
        Ok(())
    }

    /// Follow an e-mail link: exchange its token for a session.
    pub async fn confirm_email(&self, token_hash: &str, kind: OtpKind) -> AuthResult<AuthUser> {
        let result = async {
            if token_hash.trim().is_empty() {
                return Err(AuthError::Validation("Invalid confirmation link".into()));
            }
            Ok::<Session, AuthError>(self.backend.verify_otp(token_hash, kind).await?)
        }
        .await;

        let session = self.report(result, Some("Email confirmed"))?;
        self.user.send_replace(Some(session.user.clone()));
        Ok(session.user)
    }

    // ---- private helpers ----

    fn link(&self, path: &str) -> String {
        format!("{}{path}", self.redirect_url)
    }

    /// Publish the outcome of a flow as a notice and pass it through.
    fn report<T>(&self, result: AuthResult<T>, success: Option<&str>) -> AuthResult<T> {
        match &result {
            Ok(_) => {
                if let Some(message) = success {
                    self.notices.success(message);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auth request failed");
                self.notices.error(e.user_message());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn client_errors_are_rejections() {
        let err = AuthError::from(GatewayError::Api {
            status: 400,
            body: r#"{"msg":"Invalid login credentials"}"#.into(),
        });
        assert_matches!(err, AuthError::Rejected(ref m) if m == "Invalid login credentials");

        let err = AuthError::from(GatewayError::Unauthorized("Token has expired or is invalid".into()));
        assert_matches!(err, AuthError::Rejected(_));

        let err = AuthError::from(GatewayError::Api {
            status: 503,
            body: "unavailable".into(),
        });
        assert_matches!(err, AuthError::Gateway(_));
    }

    #[test]
    fn validation_message_has_no_prefix() {
        let err = AuthError::from(CoreError::Validation("Passwords do not match".into()));
        assert_eq!(err.to_string(), "Passwords do not match");
        assert_eq!(err.user_message(), "Passwords do not match");
    }
}
