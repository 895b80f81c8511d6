//! Session resolution on the page a confirmation link lands on.
//!
//! Strategies run in a fixed order and the first that yields a session wins:
//! an existing session, the fragment token of an implicit-flow link, then the
//! PKCE code in the query. On success the confirmation is broadcast to other
//! tabs and to the opener window.

use crate::{
    auth::{AuthError, AuthService},
    config::{FlowConfig, VerifierMismatchPolicy},
    link::{self, ConfirmationLink},
    signal::{ConfirmationBus, Opener, SignalMessage},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const UNCONFIRMED_MESSAGE: &str =
    "Unable to confirm email. Please try clicking the link again or request a new confirmation email.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while confirming your email. Please try again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionStatus {
    Processing,
    Success,
    Error(String),
}

/// Which strategy produced the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    ExistingSession,
    FragmentToken,
    CodeExchange,
    /// Code exchange failed on the verifier and the policy accepted it anyway.
    VerifierMismatch,
}

#[derive(Clone, Debug)]
pub struct ResolveOutcome {
    pub status: ResolutionStatus,
    pub strategy: Option<Strategy>,
    /// Location to display afterwards, fragment removed.
    pub visible_url: Url,
}

pub struct SessionResolver {
    auth: Arc<dyn AuthService>,
    bus: ConfirmationBus,
    opener: Option<Arc<dyn Opener>>,
    origin: String,
    config: FlowConfig,
    status: watch::Sender<ResolutionStatus>,
}

impl SessionResolver {
    /// `origin` is the page origin, used as target origin for opener messages.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthService>,
        bus: ConfirmationBus,
        origin: String,
        config: FlowConfig,
    ) -> Self {
        let (status, _) = watch::channel(ResolutionStatus::Processing);
        Self {
            auth,
            bus,
            opener: None,
            origin,
            config,
            status,
        }
    }

    #[must_use]
    pub fn with_opener(mut self, opener: Arc<dyn Opener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Follow status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ResolutionStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn current_status(&self) -> ResolutionStatus {
        self.status.borrow().clone()
    }

    #[instrument(skip_all, fields(path = location.path()))]
    pub async fn resolve(&self, location: &Url) -> ResolveOutcome {
        self.status.send_replace(ResolutionStatus::Processing);

        let link = ConfirmationLink::parse(location);
        let mut service_failed = false;

        let strategy = self.run_strategies(&link, &mut service_failed).await;

        let status = match strategy {
            Some(strategy) => {
                info!("Email confirmation resolved via {strategy:?}");
                self.announce(strategy == Strategy::VerifierMismatch);
                ResolutionStatus::Success
            }
            None => {
                let message = if let Some(message) = link.error_message() {
                    message.to_string()
                } else if service_failed {
                    GENERIC_FAILURE_MESSAGE.to_string()
                } else {
                    UNCONFIRMED_MESSAGE.to_string()
                };
                warn!("Email confirmation failed: {message}");
                ResolutionStatus::Error(message)
            }
        };

        self.status.send_replace(status.clone());

        ResolveOutcome {
            status,
            strategy,
            visible_url: link::strip_fragment(location),
        }
    }

    async fn run_strategies(
        &self,
        link: &ConfirmationLink,
        service_failed: &mut bool,
    ) -> Option<Strategy> {
        let mut note = |step: &str, err: &AuthError| {
            *service_failed |= err.is_service_failure();
            debug!("{step} failed: {err}");
        };

        match self.auth.get_session().await {
            Ok(Some(session)) => {
                debug!("Session already present for {:?}", session.email());
                return Some(Strategy::ExistingSession);
            }
            Ok(None) => {}
            Err(err) => note("Session lookup", &err),
        }

        if let Some(token) = link.signup_token() {
            match self
                .auth
                .set_session(&token.access_token, &token.refresh_token)
                .await
            {
                Ok(_) => return Some(Strategy::FragmentToken),
                Err(err) => note("Fragment token", &err),
            }
        }

        if let Some(code) = &link.code {
            match self.auth.exchange_code_for_session(code).await {
                Ok(_) => return Some(Strategy::CodeExchange),
                Err(AuthError::VerifierMismatch(reason))
                    if self.config.verifier_mismatch() == VerifierMismatchPolicy::Optimistic =>
                {
                    warn!(
                        "Code verifier mismatch ({reason}), reporting success so the signing-up tab can finish verification"
                    );
                    return Some(Strategy::VerifierMismatch);
                }
                Err(err) => note("Code exchange", &err),
            }
        }

        None
    }

    /// Tell other tabs and the opener. Best effort.
    fn announce(&self, optimistic: bool) {
        self.bus.publish(optimistic);

        if let Some(opener) = &self.opener {
            if let Err(err) = opener.post_message(&SignalMessage::email_confirmed(), &self.origin) {
                debug!("Could not notify opener: {err}");
            }
        }
    }
}
