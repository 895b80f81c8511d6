//! Map validated CLI matches to an [`Action`].

use crate::{
    auth::Profile,
    cli::{
        actions::{account, confirm, wait, Action},
        commands::{self, flow, project},
        globals::GlobalArgs,
    },
    forms::SignUpForm,
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use url::Url;

const WAITING_PAGE_PATH: &str = "/confirm-email";

fn globals(matches: &ArgMatches) -> Result<GlobalArgs> {
    let options = project::Options::parse(matches)?;
    let flow = flow::parse(matches)?;

    Ok(
        GlobalArgs::new(options.project_url, options.anon_key, options.site_url)
            .with_storage_dir(options.storage_dir)
            .with_flow(flow),
    )
}

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn signup_form(matches: &ArgMatches) -> Result<SignUpForm> {
    let optional = |id: &str| {
        matches
            .get_one::<String>(id)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    Ok(SignUpForm {
        email: required(matches, "email")?,
        password: SecretString::from(required(matches, "password")?),
        confirm: SecretString::from(required(matches, "confirm")?),
        profile: Profile {
            first_name: optional("first-name"),
            last_name: optional("last-name"),
            date_of_birth: optional("date-of-birth"),
            location: optional("location"),
            marketing_emails: matches.get_flag("marketing-emails"),
            consent_data_sharing: matches.get_flag("data-sharing"),
        },
    })
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    let Some((name, sub)) = matches.subcommand() else {
        anyhow::bail!("missing subcommand");
    };

    let action = match name {
        commands::CMD_SIGNUP => Action::SignUp(account::SignUpArgs {
            form: signup_form(sub)?,
            globals,
        }),
        commands::CMD_SIGNIN => Action::SignIn(account::SignInArgs {
            email: required(sub, "email")?,
            password: SecretString::from(required(sub, "password")?),
            globals,
        }),
        commands::CMD_SIGNOUT => Action::SignOut(globals),
        commands::CMD_WHOAMI => Action::WhoAmI(globals),
        commands::CMD_DASHBOARD => Action::Dashboard(globals),
        commands::CMD_CONFIRM => {
            let link = required(sub, "link")?;
            Action::Confirm(confirm::Args {
                link: Url::parse(&link).context("invalid confirmation link")?,
                globals,
            })
        }
        commands::CMD_WAIT => {
            let location = match sub.get_one::<String>("location") {
                Some(location) => Url::parse(location).context("invalid waiting page location")?,
                None => globals.page(WAITING_PAGE_PATH)?,
            };
            Action::Wait(wait::Args {
                location,
                email: sub.get_one::<String>("email").cloned(),
                globals,
            })
        }
        commands::CMD_RESEND => Action::Resend(wait::ResendArgs {
            email: required(sub, "email")?,
            globals,
        }),
        other => anyhow::bail!("unknown subcommand: {other}"),
    };

    Ok(action)
}
