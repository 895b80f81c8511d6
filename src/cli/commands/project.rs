use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;
use url::Url;

pub const ARG_PROJECT_URL: &str = "project-url";
pub const ARG_ANON_KEY: &str = "anon-key";
pub const ARG_SITE_URL: &str = "site-url";
pub const ARG_STORAGE_DIR: &str = "storage-dir";

pub struct Options {
    pub project_url: Url,
    pub anon_key: SecretString,
    pub site_url: Url,
    pub storage_dir: PathBuf,
}

impl Options {
    /// Parse auth project arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or a URL is invalid.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let project_url = matches
            .get_one::<String>(ARG_PROJECT_URL)
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("missing required argument: --{ARG_PROJECT_URL}"))?;
        let project_url = Url::parse(project_url).context("invalid ARX_PROJECT_URL")?;

        let anon_key = matches
            .get_one::<String>(ARG_ANON_KEY)
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("missing required argument: --{ARG_ANON_KEY}"))?;

        let site_url = matches
            .get_one::<String>(ARG_SITE_URL)
            .map_or("http://localhost:3000", String::as_str);
        let site_url = Url::parse(site_url).context("invalid ARX_SITE_URL")?;

        let storage_dir = matches
            .get_one::<PathBuf>(ARG_STORAGE_DIR)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".arx"));

        Ok(Self {
            project_url,
            anon_key: SecretString::from(anon_key.clone()),
            site_url,
            storage_dir,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROJECT_URL)
                .long(ARG_PROJECT_URL)
                .help("Auth project base URL, e.g. https://<ref>.supabase.co")
                .env("ARX_PROJECT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ANON_KEY)
                .long(ARG_ANON_KEY)
                .help("Public anon key sent as the apikey header")
                .env("ARX_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SITE_URL)
                .long(ARG_SITE_URL)
                .help("Site URL confirmation links redirect to")
                .env("ARX_SITE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_STORAGE_DIR)
                .long(ARG_STORAGE_DIR)
                .help("Directory holding the session and the cross-tab confirmation flags")
                .env("ARX_STORAGE_DIR")
                .default_value(".arx")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}
