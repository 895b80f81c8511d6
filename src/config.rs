//! Configuration for the auth client and the confirmation flows.
//!
//! Both structs follow the same shape: `new` fills documented defaults and
//! `with_*` builders override single values. Only the anon key is secret; it is
//! kept in a [`SecretString`] and redacted from `Debug` output.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

const DEFAULT_SIGNAL_TTL_SECONDS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 2;
const DEFAULT_RESEND_COOLDOWN_SECONDS: u64 = 10;
const DEFAULT_REDIRECT_DELAY_MS: u64 = 2_000;
const DEFAULT_AUTHENTICATED_PATH: &str = "/dashboard";
const DEFAULT_CONFIRMED_PATH: &str = "/email-confirmed";
const DEFAULT_CHANNEL_NAME: &str = "auth_channel";
const DEFAULT_STORAGE_KEY: &str = "arx-auth-token";

/// What to do when a code exchange fails because the PKCE verifier does not
/// match (typically the link was opened in a different browser than the one
/// that signed up).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifierMismatchPolicy {
    /// Report success and signal the other tab, which holds the verifier and is
    /// expected to finish verification.
    #[default]
    Optimistic,
    /// Treat the mismatch like any other failed exchange.
    Reject,
}

impl std::str::FromStr for VerifierMismatchPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "optimistic" => Ok(Self::Optimistic),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("invalid verifier mismatch policy: {value}")),
        }
    }
}

/// Timing and naming knobs shared by the resolver, the waiting page and the
/// confirmation bus.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    signal_ttl: Duration,
    poll_interval: Duration,
    resend_cooldown: Duration,
    redirect_delay: Duration,
    authenticated_path: String,
    channel_name: String,
    verifier_mismatch: VerifierMismatchPolicy,
}

impl FlowConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal_ttl: Duration::from_secs(DEFAULT_SIGNAL_TTL_SECONDS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            resend_cooldown: Duration::from_secs(DEFAULT_RESEND_COOLDOWN_SECONDS),
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
            authenticated_path: DEFAULT_AUTHENTICATED_PATH.to_string(),
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            verifier_mismatch: VerifierMismatchPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_signal_ttl(mut self, ttl: Duration) -> Self {
        self.signal_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_authenticated_path(mut self, path: String) -> Self {
        self.authenticated_path = path;
        self
    }

    #[must_use]
    pub fn with_channel_name(mut self, name: String) -> Self {
        self.channel_name = name;
        self
    }

    #[must_use]
    pub fn with_verifier_mismatch(mut self, policy: VerifierMismatchPolicy) -> Self {
        self.verifier_mismatch = policy;
        self
    }

    #[must_use]
    pub fn signal_ttl(&self) -> Duration {
        self.signal_ttl
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> Duration {
        self.resend_cooldown
    }

    #[must_use]
    pub fn redirect_delay(&self) -> Duration {
        self.redirect_delay
    }

    #[must_use]
    pub fn authenticated_path(&self) -> &str {
        &self.authenticated_path
    }

    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    #[must_use]
    pub fn verifier_mismatch(&self) -> VerifierMismatchPolicy {
        self.verifier_mismatch
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection settings for the remote auth service.
#[derive(Clone)]
pub struct AuthClientConfig {
    project_url: Url,
    anon_key: SecretString,
    site_url: Url,
    storage_key: String,
}

impl AuthClientConfig {
    #[must_use]
    pub fn new(project_url: Url, anon_key: SecretString, site_url: Url) -> Self {
        Self {
            project_url,
            anon_key,
            site_url,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: String) -> Self {
        self.storage_key = key;
        self
    }

    #[must_use]
    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &SecretString {
        &self.anon_key
    }

    #[must_use]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Storage key holding the PKCE code verifier between sign-up and exchange.
    #[must_use]
    pub fn verifier_storage_key(&self) -> String {
        format!("{}-code-verifier", self.storage_key)
    }

    /// Endpoint under `{project}/auth/v1`, e.g. `auth_endpoint("token")`.
    #[must_use]
    pub fn auth_endpoint(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.project_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Table endpoint of the data API, `{project}/rest/v1/{table}`.
    #[must_use]
    pub fn rest_endpoint(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.project_url.as_str().trim_end_matches('/'),
            table.trim_start_matches('/')
        )
    }

    /// Where confirmation links should land: `{site}/email-confirmed`.
    #[must_use]
    pub fn email_redirect_to(&self) -> String {
        format!(
            "{}{DEFAULT_CONFIRMED_PATH}",
            self.site_url.as_str().trim_end_matches('/')
        )
    }

    /// Origin of the site, used as target origin for opener messages.
    #[must_use]
    pub fn site_origin(&self) -> String {
        self.site_url.origin().ascii_serialization()
    }
}

impl std::fmt::Debug for AuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClientConfig")
            .field("project_url", &self.project_url.as_str())
            .field("anon_key", &"***")
            .field("site_url", &self.site_url.as_str())
            .field("storage_key", &self.storage_key)
            .finish()
    }
}
