pub mod flow;
pub mod logging;
pub mod project;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const CMD_SIGNUP: &str = "signup";
pub const CMD_SIGNIN: &str = "signin";
pub const CMD_SIGNOUT: &str = "signout";
pub const CMD_WHOAMI: &str = "whoami";
pub const CMD_DASHBOARD: &str = "dashboard";
pub const CMD_CONFIRM: &str = "confirm";
pub const CMD_WAIT: &str = "wait";
pub const CMD_RESEND: &str = "resend";

fn email_arg(required: bool) -> Arg {
    Arg::new("email")
        .long("email")
        .help("Account email address")
        .required(required)
}

fn password_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(if id == "password" {
            "ARX_PASSWORD"
        } else {
            "ARX_PASSWORD_CONFIRM"
        })
        .hide_env_values(true)
        .required(true)
}

fn signup() -> Command {
    Command::new(CMD_SIGNUP)
        .about("Create an account; a confirmation email is sent")
        .arg(email_arg(true))
        .arg(password_arg("password", "Password, at least 6 characters"))
        .arg(password_arg("confirm", "Password again"))
        .arg(Arg::new("first-name").long("first-name").help("First name"))
        .arg(Arg::new("last-name").long("last-name").help("Last name"))
        .arg(
            Arg::new("date-of-birth")
                .long("date-of-birth")
                .help("Date of birth (YYYY-MM-DD)"),
        )
        .arg(Arg::new("location").long("location").help("Location"))
        .arg(
            Arg::new("marketing-emails")
                .long("marketing-emails")
                .help("Opt in to marketing emails")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("data-sharing")
                .long("data-sharing")
                .help("Consent to data sharing")
                .action(ArgAction::SetTrue),
        )
}

fn signin() -> Command {
    Command::new(CMD_SIGNIN)
        .about("Sign in with email and password")
        .arg(email_arg(true))
        .arg(password_arg("password", "Password"))
}

fn confirm() -> Command {
    Command::new(CMD_CONFIRM)
        .about("Resolve a session from a confirmation link and signal waiting sessions")
        .arg(
            Arg::new("link")
                .help("Confirmation link as received by email, after redirect")
                .required(true),
        )
}

fn wait() -> Command {
    Command::new(CMD_WAIT)
        .about("Wait for the email to be confirmed, then continue to the dashboard")
        .long_about(
            "Wait for the email to be confirmed, then continue to the dashboard.\n\nType `r` and Enter to resend the confirmation email.",
        )
        .arg(
            Arg::new("location")
                .help("Location of the waiting page (default: <site-url>/confirm-email)"),
        )
        .arg(email_arg(false).help("Email address for resends"))
}

fn resend() -> Command {
    Command::new(CMD_RESEND)
        .about("Resend the sign-up confirmation email")
        .arg(email_arg(true))
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("arx")
        .about("Account and email confirmation client")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(signup())
        .subcommand(signin())
        .subcommand(Command::new(CMD_SIGNOUT).about("Sign out and forget the local session"))
        .subcommand(Command::new(CMD_WHOAMI).about("Show the signed-in user"))
        .subcommand(
            Command::new(CMD_DASHBOARD)
                .about("Show the profile and connected devices of the signed-in user"),
        )
        .subcommand(confirm())
        .subcommand(wait())
        .subcommand(resend());

    let command = project::with_args(command);
    let command = flow::with_args(command);
    logging::with_args(command)
}
