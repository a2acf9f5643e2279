//! Account service of the in-process backend.
//!
//! Passwords are stored as Argon2id PHC strings. Access tokens are
//! HS256 JWTs signed with a per-backend random secret; refresh tokens are
//! opaque random strings of which only the SHA-256 hash is kept.
//! Confirmation and recovery links are not mailed but collected in an
//! outbox readable through [`MemoryBackend::outbox`].

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use keepmd_core::types::UserId;
use keepmd_core::validation::MIN_PASSWORD_LENGTH;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::MemoryBackend;
use crate::auth::{AuthBackend, AuthUser, OtpKind, Session, SignUpOutcome};
use crate::error::{GatewayError, GatewayResult};

/// Access token lifetime in seconds.
const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Length of generated refresh and one-time tokens.
const TOKEN_LEN: usize = 40;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A confirmation or recovery link that would have been e-mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMail {
    pub to: String,
    pub kind: OtpKind,
    pub token_hash: String,
    pub redirect_to: String,
}

impl AuthMail {
    /// The link as the recipient would see it.
    pub fn link(&self) -> String {
        format!(
            "{}?token_hash={}&type={}",
            self.redirect_to,
            self.token_hash,
            self.kind.as_str()
        )
    }
}

#[derive(Debug)]
struct Account {
    user: AuthUser,
    password_hash: String,
}

#[derive(Debug, Clone, Copy)]
struct PendingOtp {
    user_id: UserId,
    kind: OtpKind,
}

#[derive(Debug, Serialize, Deserialize)]
struct IssuedClaims {
    sub: UserId,
    email: String,
    role: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug)]
pub(crate) struct Accounts {
    pub(crate) require_confirmation: bool,
    jwt_secret: String,
    accounts: Vec<Account>,
    session: Option<Session>,
    /// SHA-256 of each live refresh token.
    refresh_tokens: HashMap<String, UserId>,
    otps: HashMap<String, PendingOtp>,
    outbox: Vec<AuthMail>,
}

impl Accounts {
    pub(crate) fn new(require_confirmation: bool) -> Self {
        Self {
            require_confirmation,
            jwt_secret: random_token(),
            accounts: Vec::new(),
            session: None,
            refresh_tokens: HashMap::new(),
            otps: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    fn by_email(&self, email: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))
    }

    fn by_id_mut(&mut self, id: UserId) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.user.id == id)
    }

    /// Issue a session for `user` and make it current.
    fn start_session(&mut self, user: AuthUser) -> GatewayResult<Session> {
        let now = Utc::now().timestamp();
        let claims = IssuedClaims {
            sub: user.id,
            email: user.email.clone(),
            role: "authenticated".to_string(),
            exp: now + ACCESS_TOKEN_TTL_SECS,
            iat: now,
        };
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| GatewayError::Api {
            status: 500,
            body: format!("Failed to sign access token: {e}"),
        })?;

        let refresh_token = random_token();
        self.refresh_tokens.insert(sha256_hex(&refresh_token), user.id);

        let session = Session {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_at: claims.exp,
            user,
        };
        self.session = Some(session.clone());
        Ok(session)
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.refresh_tokens.remove(&sha256_hex(&session.refresh_token));
        }
    }

    /// Record a one-time token for `user` and queue the mail carrying it.
    fn send_link(&mut self, user: &AuthUser, kind: OtpKind, redirect_to: &str) {
        let token_hash = sha256_hex(&random_token());
        self.otps.insert(
            token_hash.clone(),
            PendingOtp {
                user_id: user.id,
                kind,
            },
        );
        self.outbox.push(AuthMail {
            to: user.email.clone(),
            kind,
            token_hash,
            redirect_to: redirect_to.to_string(),
        });
    }

    fn verify_access_token(&self, token: &str) -> GatewayResult<IssuedClaims> {
        decode::<IssuedClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| GatewayError::Unauthorized(format!("Invalid JWT: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn random_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn sha256_hex(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Argon2id with minimal cost parameters: this backend never holds real
/// credentials.
fn hash_password(password: &str) -> GatewayResult<String> {
    let internal = |e: &dyn std::fmt::Display| GatewayError::Api {
        status: 500,
        body: format!("Password hashing failed: {e}"),
    };
    let params = Params::new(
        Params::MIN_M_COST,
        Params::MIN_T_COST,
        Params::MIN_P_COST,
        None,
    )
    .map_err(|e| internal(&e))?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| internal(&e))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// An error shaped like the hosted auth service's JSON responses.
fn auth_error(status: u16, message: &str) -> GatewayError {
    GatewayError::Api {
        status,
        body: json!({ "msg": message }).to_string(),
    }
}

fn check_password_length(password: &str) -> GatewayResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(auth_error(
            422,
            &format!("Password should be at least {MIN_PASSWORD_LENGTH} characters."),
        ));
    }
    Ok(())
}

fn session_missing() -> GatewayError {
    GatewayError::Unauthorized("Auth session missing!".into())
}

// ---------------------------------------------------------------------------
// Backend methods
// ---------------------------------------------------------------------------

impl MemoryBackend {
    /// Create a confirmed account directly, bypassing sign-up.
    pub fn seed_user(&self, email: &str, password: &str) -> GatewayResult<AuthUser> {
        let password_hash = hash_password(password)?;
        let mut accounts = self.accounts();
        if accounts.by_email(email).is_some() {
            return Err(auth_error(422, "User already registered"));
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            email_confirmed_at: Some(Utc::now()),
        };
        accounts.accounts.push(Account {
            user: user.clone(),
            password_hash,
        });
        Ok(user)
    }

    /// Every link sent so far, oldest first.
    pub fn outbox(&self) -> Vec<AuthMail> {
        self.accounts().outbox.clone()
    }

    /// The most recent link sent to `email`.
    pub fn last_mail_to(&self, email: &str) -> Option<AuthMail> {
        self.accounts()
            .outbox
            .iter()
            .rev()
            .find(|m| m.to.eq_ignore_ascii_case(email))
            .cloned()
    }

    /// Force the current session's access token to look expired.
    pub fn expire_session(&self) {
        if let Some(session) = self.accounts().session.as_mut() {
            session.expires_at = Utc::now().timestamp() - 1;
        }
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> GatewayResult<Option<Session>> {
        let current = self.accounts().session.clone();
        match current {
            Some(session) if session.is_expired() => self.refresh_session().await.map(Some),
            other => Ok(other),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> GatewayResult<Session> {
        let mut accounts = self.accounts();
        let user = match accounts.by_email(email) {
            Some(account) if verify_password(password, &account.password_hash) => {
                account.user.clone()
            }
            _ => return Err(auth_error(400, "Invalid login credentials")),
        };
        if user.email_confirmed_at.is_none() {
            return Err(auth_error(400, "Email not confirmed"));
        }
        accounts.end_session();
        let session = accounts.start_session(user)?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: &str,
    ) -> GatewayResult<SignUpOutcome> {
        check_password_length(password)?;
        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts();
        if accounts.by_email(email).is_some() {
            return Err(auth_error(422, "User already registered"));
        }

        let confirmed = !accounts.require_confirmation;
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            email_confirmed_at: confirmed.then(Utc::now),
        };
        accounts.accounts.push(Account {
            user: user.clone(),
            password_hash,
        });

        if confirmed {
            let session = accounts.start_session(user)?;
            return Ok(SignUpOutcome::SignedIn(session));
        }
        accounts.send_link(&user, OtpKind::Signup, redirect_to);
        tracing::info!(user_id = %user.id, "Confirmation link queued");
        Ok(SignUpOutcome::ConfirmationSent(user))
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.accounts().end_session();
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> GatewayResult<()> {
        let mut accounts = self.accounts();
        if let Some(user) = accounts.by_email(email).map(|a| a.user.clone()) {
            accounts.send_link(&user, OtpKind::Recovery, redirect_to);
        }
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> GatewayResult<AuthUser> {
        check_password_length(new_password)?;
        let password_hash = hash_password(new_password)?;

        let mut accounts = self.accounts();
        let token = accounts
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(session_missing)?;
        let claims = accounts.verify_access_token(&token)?;

        let account = accounts
            .by_id_mut(claims.sub)
            .ok_or_else(|| GatewayError::NotFound("User not found".into()))?;
        account.password_hash = password_hash;
        Ok(account.user.clone())
    }

    async fn verify_otp(&self, token_hash: &str, kind: OtpKind) -> GatewayResult<Session> {
        let mut accounts = self.accounts();
        let pending = match accounts.otps.get(token_hash) {
            Some(p) if p.kind == kind => *p,
            _ => {
                return Err(GatewayError::Unauthorized(
                    "Token has expired or is invalid".into(),
                ))
            }
        };
        accounts.otps.remove(token_hash);

        let account = accounts
            .by_id_mut(pending.user_id)
            .ok_or_else(|| GatewayError::NotFound("User not found".into()))?;
        if kind == OtpKind::Signup && account.user.email_confirmed_at.is_none() {
            account.user.email_confirmed_at = Some(Utc::now());
        }
        let user = account.user.clone();

        accounts.end_session();
        accounts.start_session(user)
    }

    async fn refresh_session(&self) -> GatewayResult<Session> {
        let mut accounts = self.accounts();
        let refresh_token = accounts
            .session
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or_else(session_missing)?;

        let Some(user_id) = accounts.refresh_tokens.remove(&sha256_hex(&refresh_token)) else {
            accounts.session = None;
            return Err(GatewayError::Unauthorized("Invalid Refresh Token".into()));
        };
        let user = accounts
            .accounts
            .iter()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| GatewayError::NotFound("User not found".into()))?;
        accounts.start_session(user)
    }
}
