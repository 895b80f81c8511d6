//! Remote auth service surface.
//!
//! [`AuthService`] is the seam between the confirmation flows and the hosted
//! auth API; [`client::GoTrueClient`] implements it over HTTP. Sessions and
//! users are owned by the remote service, the client only reads them and keeps
//! the last issued session in local storage.

pub mod client;
pub mod pkce;
#[cfg(test)]
pub(crate) mod testing;

pub use self::client::GoTrueClient;

use crate::signal::StoreError;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
}

impl User {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at
            .as_deref()
            .is_some_and(|at| !at.is_empty())
    }
}

pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// Unix seconds, when the service reported it.
    pub expires_at: Option<u64>,
    pub user: User,
}

impl Session {
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Profile metadata attached to a sign-up as `data`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub marketing_emails: bool,
    pub consent_data_sharing: bool,
}

pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub profile: Profile,
}

#[derive(Debug)]
pub struct SignUpOutcome {
    pub user: User,
    pub session: Option<Session>,
    pub needs_email_confirmation: bool,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Email not confirmed")]
    EmailNotConfirmed,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Invalid email: {0}")]
    InvalidEmail(String),
    #[error("Password rejected: {0}")]
    WeakPassword(String),
    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),
    #[error("Code verifier mismatch: {0}")]
    VerifierMismatch(String),
    #[error("No active session")]
    MissingSession,
    #[error("Auth service error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Failures of the service or the transport rather than of the credential.
    #[must_use]
    pub fn is_service_failure(&self) -> bool {
        match self {
            Self::Network(_) | Self::Decode(_) | Self::Store(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map an error response onto the taxonomy using the service's error code
    /// and message.
    #[must_use]
    pub fn classify(status: u16, code: Option<&str>, message: &str) -> Self {
        let lower = message.to_lowercase();
        let code = code.unwrap_or_default();

        if code == "invalid_credentials" || lower.contains("invalid login credentials") {
            Self::InvalidCredentials
        } else if code == "email_not_confirmed" || lower.contains("email not confirmed") {
            Self::EmailNotConfirmed
        } else if code == "user_already_exists" || lower.contains("already registered") {
            Self::AlreadyRegistered
        } else if code == "bad_code_verifier" || lower.contains("code verifier") {
            Self::VerifierMismatch(message.to_string())
        } else if code == "email_address_invalid"
            || lower.contains("invalid email")
            || lower.contains("unable to validate email")
        {
            Self::InvalidEmail(message.to_string())
        } else if code == "weak_password" || lower.contains("password") {
            Self::WeakPassword(message.to_string())
        } else if matches!(code, "otp_expired" | "bad_jwt" | "flow_state_expired" | "flow_state_not_found")
            || status == 401
            || lower.contains("expired")
            || lower.contains("invalid jwt")
            || lower.contains("invalid flow state")
        {
            Self::InvalidToken(message.to_string())
        } else {
            Self::Api {
                status,
                message: message.to_string(),
            }
        }
    }
}

/// Operations consumed from the remote auth service.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Current session, `None` when signed out or expired beyond refresh.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// User of the current session as the service sees it now.
    async fn get_user(&self) -> Result<Option<User>, AuthError>;

    /// Establish a session from a token pair delivered in a link fragment.
    async fn set_session(
        &self,
        access_token: &SecretString,
        refresh_token: &SecretString,
    ) -> Result<Session, AuthError>;

    /// Exchange a PKCE auth code for a session.
    async fn exchange_code_for_session(&self, code: &SecretString) -> Result<Session, AuthError>;

    async fn resend_confirmation(&self, email: &str) -> Result<(), AuthError>;
}
