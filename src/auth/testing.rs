//! Scriptable [`AuthService`] for flow tests.

use super::{AuthError, AuthService, Session, SignUpOutcome, SignUpRequest, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::SecretString;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Reply {
    #[default]
    Ok,
    InvalidToken,
    VerifierMismatch,
    Unavailable,
}

impl Reply {
    fn check(self) -> Result<(), AuthError> {
        match self {
            Self::Ok => Ok(()),
            Self::InvalidToken => Err(AuthError::InvalidToken(
                "Email link is invalid or has expired".to_string(),
            )),
            Self::VerifierMismatch => Err(AuthError::VerifierMismatch(
                "code challenge does not match previously saved code verifier".to_string(),
            )),
            Self::Unavailable => Err(AuthError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeAuth {
    pub has_session: bool,
    pub get_session: Reply,
    pub set_session: Reply,
    pub exchange: Reply,
    pub user: Option<User>,
    pub get_user: Reply,
    pub resend: Reply,
    /// How long a resend request takes to answer.
    pub resend_delay: Duration,
    pub(crate) calls: Mutex<Vec<&'static str>>,
}

impl FakeAuth {
    pub fn confirmed_user() -> User {
        User {
            id: "user-1".to_string(),
            email: Some("ada@arx.health".to_string()),
            email_confirmed_at: Some("2026-10-16T10:00:00Z".to_string()),
        }
    }

    pub fn unconfirmed_user() -> User {
        User {
            email_confirmed_at: None,
            ..Self::confirmed_user()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|name| **name == call).count()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn session() -> Session {
        Session {
            access_token: SecretString::from("access"),
            refresh_token: SecretString::from("refresh"),
            expires_at: None,
            user: Self::confirmed_user(),
        }
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, AuthError> {
        self.record("sign_up");
        Ok(SignUpOutcome {
            user: User {
                email: Some(request.email.clone()),
                ..Self::unconfirmed_user()
            },
            session: None,
            needs_email_confirmation: true,
        })
    }

    async fn sign_in(&self, _email: &str, _password: &SecretString) -> Result<Session, AuthError> {
        self.record("sign_in");
        Ok(Self::session())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.record("sign_out");
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.record("get_session");
        self.get_session.check()?;
        Ok(self.has_session.then(Self::session))
    }

    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        self.record("get_user");
        self.get_user.check()?;
        Ok(self.user.clone())
    }

    async fn set_session(
        &self,
        _access_token: &SecretString,
        _refresh_token: &SecretString,
    ) -> Result<Session, AuthError> {
        self.record("set_session");
        self.set_session.check()?;
        Ok(Self::session())
    }

    async fn exchange_code_for_session(&self, _code: &SecretString) -> Result<Session, AuthError> {
        self.record("exchange_code_for_session");
        self.exchange.check()?;
        Ok(Self::session())
    }

    async fn resend_confirmation(&self, _email: &str) -> Result<(), AuthError> {
        self.record("resend_confirmation");
        if !self.resend_delay.is_zero() {
            tokio::time::sleep(self.resend_delay).await;
        }
        self.resend.check()
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_and_call_log() {
        let auth = FakeAuth {
            get_user: Reply::Unavailable,
            ..FakeAuth::default()
        };

        assert!(auth.get_user().await.is_err());
        assert!(auth.get_session().await.is_ok_and(|session| session.is_none()));
        assert_eq!(auth.calls(), vec!["get_user", "get_session"]);
        assert_eq!(auth.count("get_user"), 1);
    }
}
