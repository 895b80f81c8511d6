//! The page a user waits on after signing up.
//!
//! `checking` resolves to `waiting`, `error` or `confirmed`. A waiting page
//! follows the confirmation bus until a fresh signal arrives. `confirmed` is
//! terminal and leads to exactly one navigation to the authenticated area.

use crate::{
    auth::{AuthError, AuthService},
    config::FlowConfig,
    forms,
    link::ConfirmationLink,
    signal::ConfirmationBus,
    watch::{ConfirmationWatch, WatchMode},
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep, Instant},
};
use tracing::{debug, error, info, instrument};
use url::Url;

pub const LINK_ERROR_MESSAGE: &str = "There was an error confirming your email.";
pub const CHECK_ERROR_MESSAGE: &str = "There was an error checking your email confirmation.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitingState {
    Checking,
    /// Confirmation pending; `email` is remembered for resends.
    Waiting { email: Option<String> },
    Error(String),
    Confirmed,
}

/// Moves the user to another page.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

#[derive(Debug, Error)]
pub enum ResendError {
    #[error("Please wait {}s before requesting another email.", .remaining.as_millis().div_ceil(1_000))]
    CoolingDown { remaining: Duration },
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Failed to resend confirmation email. Please try again.")]
    Failed(#[source] AuthError),
}

/// Client-side rate limit on resends.
#[derive(Debug)]
pub struct ResendCooldown {
    duration: Duration,
    started: Option<Instant>,
}

impl ResendCooldown {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: None,
        }
    }

    /// Zero when a resend is allowed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |started| {
            self.duration.saturating_sub(started.elapsed())
        })
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }
}

pub struct WaitingPage {
    auth: Arc<dyn AuthService>,
    bus: ConfirmationBus,
    navigator: Arc<dyn Navigator>,
    config: FlowConfig,
    state: watch::Sender<WaitingState>,
    remembered_email: Mutex<Option<String>>,
    cooldown: Mutex<ResendCooldown>,
    navigated: AtomicBool,
}

impl WaitingPage {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthService>,
        bus: ConfirmationBus,
        navigator: Arc<dyn Navigator>,
        config: FlowConfig,
    ) -> Self {
        let (state, _) = watch::channel(WaitingState::Checking);
        let cooldown = ResendCooldown::new(config.resend_cooldown());
        Self {
            auth,
            bus,
            navigator,
            config,
            state,
            remembered_email: Mutex::new(None),
            cooldown: Mutex::new(cooldown),
            navigated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn state(&self) -> watch::Receiver<WaitingState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_state(&self) -> WaitingState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn remembered_email(&self) -> Option<String> {
        self.remembered_email.lock().clone()
    }

    fn set_state(&self, state: WaitingState) -> WaitingState {
        debug!("Waiting page state: {state:?}");
        self.state.send_replace(state.clone());
        state
    }

    /// Initial check of the current location and session.
    #[instrument(skip_all)]
    pub async fn check(&self, location: &Url) -> WaitingState {
        self.set_state(WaitingState::Checking);
        let link = ConfirmationLink::parse(location);

        if let Some(link_error) = &link.error {
            let message = link_error
                .description
                .clone()
                .unwrap_or_else(|| LINK_ERROR_MESSAGE.to_string());
            return self.set_state(WaitingState::Error(message));
        }

        if link.signup_token().is_some() {
            return self.set_state(WaitingState::Confirmed);
        }

        if self.bus.take_fresh().is_some() {
            debug!("Fresh confirmation already on the bus");
            return self.set_state(WaitingState::Confirmed);
        }

        match self.auth.get_user().await {
            Ok(Some(user)) => {
                if user.email.is_some() {
                    *self.remembered_email.lock() = user.email.clone();
                }
                if user.is_confirmed() {
                    self.set_state(WaitingState::Confirmed)
                } else {
                    self.set_state(WaitingState::Waiting { email: user.email })
                }
            }
            Ok(None) => self.set_state(WaitingState::Waiting {
                email: self.remembered_email(),
            }),
            Err(err) => {
                error!("Failed to check email confirmation: {err}");
                self.set_state(WaitingState::Error(CHECK_ERROR_MESSAGE.to_string()))
            }
        }
    }

    /// Check, then follow the bus until confirmed, then navigate. Returns the
    /// final state; an error state ends the run without navigating.
    pub async fn run(&self, location: &Url) -> WaitingState {
        match self.check(location).await {
            WaitingState::Confirmed => {}
            WaitingState::Waiting { .. } => {
                let mut watch = ConfirmationWatch::new(
                    self.bus.clone(),
                    self.config.poll_interval(),
                    WatchMode::UntilConfirmed,
                );
                if let Some(observed) = watch.next().await {
                    info!("Email confirmed in another tab via {:?}", observed.source);
                }
            }
            state => return state,
        }

        self.complete().await;
        WaitingState::Confirmed
    }

    /// Enter `confirmed` and navigate after the redirect delay. Only the first
    /// call navigates; later calls return `false` immediately.
    pub async fn complete(&self) -> bool {
        self.set_state(WaitingState::Confirmed);

        if self
            .navigated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        sleep(self.config.redirect_delay()).await;
        self.navigator.navigate(self.config.authenticated_path());
        true
    }

    #[must_use]
    pub fn resend_remaining(&self) -> Duration {
        self.cooldown.lock().remaining()
    }

    /// Resend the confirmation email to `email`, or to the remembered address
    /// when `email` is empty or absent.
    ///
    /// # Errors
    /// Fails while cooling down, for an invalid address, or when the service
    /// rejects the request.
    #[instrument(skip(self))]
    pub async fn resend(&self, email: Option<&str>) -> Result<(), ResendError> {
        let target = email
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .or_else(|| self.remembered_email());

        let Some(target) = target.filter(|email| forms::valid_email(email)) else {
            return Err(ResendError::InvalidEmail);
        };

        {
            let mut cooldown = self.cooldown.lock();
            let remaining = cooldown.remaining();
            if !remaining.is_zero() {
                return Err(ResendError::CoolingDown { remaining });
            }
            cooldown.start();
        }

        match self.auth.resend_confirmation(&target).await {
            Ok(()) => {
                info!("Confirmation email resent to {target}");
                Ok(())
            }
            Err(err) => {
                error!("Failed to resend confirmation email: {err}");
                Err(ResendError::Failed(err))
            }
        }
    }
}
