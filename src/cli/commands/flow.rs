use crate::config::{FlowConfig, VerifierMismatchPolicy};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_SIGNAL_TTL_SECONDS: &str = "signal-ttl-seconds";
pub const ARG_POLL_INTERVAL_SECONDS: &str = "poll-interval-seconds";
pub const ARG_RESEND_COOLDOWN_SECONDS: &str = "resend-cooldown-seconds";
pub const ARG_REDIRECT_DELAY_MS: &str = "redirect-delay-ms";
pub const ARG_VERIFIER_MISMATCH: &str = "verifier-mismatch";

/// Build the flow configuration; arguments left unset keep the defaults.
///
/// # Errors
/// Returns an error if a value is out of range.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<FlowConfig> {
    let mut config = FlowConfig::new();

    if let Some(seconds) = matches.get_one::<u64>(ARG_SIGNAL_TTL_SECONDS) {
        config = config.with_signal_ttl(Duration::from_secs(*seconds));
    }
    if let Some(seconds) = matches.get_one::<u64>(ARG_POLL_INTERVAL_SECONDS) {
        if *seconds == 0 {
            anyhow::bail!("--{ARG_POLL_INTERVAL_SECONDS} must be greater than zero");
        }
        config = config.with_poll_interval(Duration::from_secs(*seconds));
    }
    if let Some(seconds) = matches.get_one::<u64>(ARG_RESEND_COOLDOWN_SECONDS) {
        config = config.with_resend_cooldown(Duration::from_secs(*seconds));
    }
    if let Some(millis) = matches.get_one::<u64>(ARG_REDIRECT_DELAY_MS) {
        config = config.with_redirect_delay(Duration::from_millis(*millis));
    }
    if let Some(policy) = matches.get_one::<String>(ARG_VERIFIER_MISMATCH) {
        let policy = policy
            .parse::<VerifierMismatchPolicy>()
            .map_err(|err| anyhow::anyhow!(err))?;
        config = config.with_verifier_mismatch(policy);
    }

    Ok(config)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNAL_TTL_SECONDS)
                .long(ARG_SIGNAL_TTL_SECONDS)
                .help("Seconds a cross-tab confirmation signal stays valid")
                .env("ARX_SIGNAL_TTL_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_POLL_INTERVAL_SECONDS)
                .long(ARG_POLL_INTERVAL_SECONDS)
                .help("Seconds between confirmation polls while waiting")
                .env("ARX_POLL_INTERVAL_SECONDS")
                .default_value("2")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RESEND_COOLDOWN_SECONDS)
                .long(ARG_RESEND_COOLDOWN_SECONDS)
                .help("Seconds before another confirmation email can be requested")
                .env("ARX_RESEND_COOLDOWN_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REDIRECT_DELAY_MS)
                .long(ARG_REDIRECT_DELAY_MS)
                .help("Milliseconds between confirmation and navigation")
                .env("ARX_REDIRECT_DELAY_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_VERIFIER_MISMATCH)
                .long(ARG_VERIFIER_MISMATCH)
                .help("How to treat a code exchange failing on the PKCE verifier")
                .long_help(
                    "How to treat a code exchange failing on the PKCE verifier.\n\n`optimistic` reports success and signals the tab that signed up, which holds the\nverifier. `reject` treats the link as unusable.",
                )
                .env("ARX_VERIFIER_MISMATCH")
                .default_value("optimistic")
                .value_parser(PossibleValuesParser::new(["optimistic", "reject"])),
        )
}
