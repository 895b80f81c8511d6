//! # arx (account and email confirmation client)
//!
//! `arx` drives the account flow of the arx health-data contribution platform
//! against a GoTrue-compatible auth service: sign-up, sign-in, sign-out and the
//! email confirmation flow.
//!
//! ## Email confirmation
//!
//! Two cooperating flows share a cross-tab confirmation signal:
//!
//! - The **session resolver** ([`resolver::SessionResolver`]) runs where the
//!   confirmation link lands. It tries, in order, an existing session, a
//!   fragment token (`#access_token=...&type=signup`) and a query code
//!   (`?code=...`), and publishes the signal on success.
//! - The **waiting page** ([`waiting::WaitingPage`]) runs where the user signed
//!   up. It watches the signal through a single stream
//!   ([`watch::ConfirmationWatch`]) fed by storage events, broadcast messages
//!   and a fallback poll, then navigates once to the authenticated area.
//!
//! Signals carry a timestamp and expire after a TTL (30 seconds by default);
//! stale signals are discarded and cleared when observed.
//!
//! ## Dashboard
//!
//! [`dashboard::open`] gates the authenticated area: no user goes to sign-in,
//! no profile row goes to sign-up, otherwise the profile and active device
//! connections are loaded from the data API.

pub mod auth;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod forms;
pub mod link;
pub mod resolver;
pub mod signal;
pub mod waiting;
pub mod watch;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
