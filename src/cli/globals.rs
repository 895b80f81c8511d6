use crate::config::{AuthClientConfig, FlowConfig};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

/// Settings shared by every command.
#[derive(Clone)]
pub struct GlobalArgs {
    pub project_url: Url,
    pub anon_key: SecretString,
    pub site_url: Url,
    pub storage_dir: PathBuf,
    pub flow: FlowConfig,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(project_url: Url, anon_key: SecretString, site_url: Url) -> Self {
        Self {
            project_url,
            anon_key,
            site_url,
            storage_dir: PathBuf::from(".arx"),
            flow: FlowConfig::default(),
        }
    }

    #[must_use]
    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = dir;
        self
    }

    #[must_use]
    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    #[must_use]
    pub fn client_config(&self) -> AuthClientConfig {
        AuthClientConfig::new(
            self.project_url.clone(),
            self.anon_key.clone(),
            self.site_url.clone(),
        )
    }

    /// A page of the site, e.g. `page("/confirm-email")`.
    ///
    /// # Errors
    /// Returns an error if `path` cannot be joined onto the site URL.
    pub fn page(&self, path: &str) -> Result<Url, url::ParseError> {
        self.site_url.join(path)
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("project_url", &self.project_url.as_str())
            .field("anon_key", &"***")
            .field("site_url", &self.site_url.as_str())
            .field("storage_dir", &self.storage_dir)
            .field("flow", &self.flow)
            .finish()
    }
}
