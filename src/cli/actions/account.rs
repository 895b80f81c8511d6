use crate::{
    auth::AuthService,
    cli::{actions::Context, globals::GlobalArgs},
    dashboard::{self, DashboardGate, SIGNIN_PATH},
    forms::{self, SignUpForm},
};
use anyhow::{anyhow, bail, Result};
use secrecy::SecretString;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct SignUpArgs {
    pub globals: GlobalArgs,
    pub form: SignUpForm,
}

#[derive(Debug)]
pub struct SignInArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

/// Validate the form, create the account and tell the user what comes next.
/// # Errors
/// Returns an error if the form is invalid or the service rejects the sign-up.
#[instrument(skip_all)]
pub async fn sign_up(args: SignUpArgs) -> Result<()> {
    let request = args.form.validate().map_err(|errors| {
        let lines: Vec<String> = errors
            .iter()
            .map(|err| format!("{:?}: {err}", err.field()))
            .collect();
        anyhow!(lines.join("\n"))
    })?;

    let context = Context::new(&args.globals)?;
    let outcome = context
        .auth
        .sign_up(&request)
        .await
        .map_err(|err| anyhow!(forms::sign_up_error_message(&err)))?;

    debug!("Signed up user {}", outcome.user.id);

    if outcome.needs_email_confirmation {
        println!("We've sent a confirmation email to {}.", request.email);
        println!("Run `arx wait` to continue once the link has been opened.");
    } else {
        println!(
            "Account created. Continue at {}",
            args.globals.page(context.flow.authenticated_path())?
        );
    }

    Ok(())
}

/// # Errors
/// Returns an error if the credentials are rejected.
#[instrument(skip_all, fields(email = %args.email))]
pub async fn sign_in(args: SignInArgs) -> Result<()> {
    let context = Context::new(&args.globals)?;
    let session = context
        .auth
        .sign_in(args.email.trim(), &args.password)
        .await
        .map_err(|err| anyhow!(forms::sign_in_error_message(&err)))?;

    println!(
        "Signed in as {}. Continue at {}",
        session.email().unwrap_or(args.email.as_str()),
        args.globals.page(context.flow.authenticated_path())?
    );

    Ok(())
}

/// # Errors
/// Returns an error if the service fails to end the session.
pub async fn sign_out(globals: &GlobalArgs) -> Result<()> {
    let context = Context::new(globals)?;
    context.auth.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

/// # Errors
/// Returns an error if the user cannot be looked up.
pub async fn whoami(globals: &GlobalArgs) -> Result<()> {
    let context = Context::new(globals)?;

    match context.auth.get_user().await? {
        Some(user) => {
            println!("{}", user.email.as_deref().unwrap_or(user.id.as_str()));
            if user.is_confirmed() {
                println!("Email confirmed");
            } else {
                println!("Email not confirmed yet");
            }
        }
        None => println!("Not signed in."),
    }

    Ok(())
}

/// Print the signed-in user's profile and active devices.
/// # Errors
/// Returns an error pointing at sign-in or sign-up when the dashboard is not
/// available, or if a lookup fails.
#[instrument(skip_all)]
pub async fn dashboard(globals: &GlobalArgs) -> Result<()> {
    let context = Context::new(globals)?;

    let board = match dashboard::open(&*context.auth, &*context.auth).await? {
        DashboardGate::Ready(board) => board,
        DashboardGate::Redirect(path) if path == SIGNIN_PATH => {
            bail!("Not signed in. Continue at {}", globals.page(path)?)
        }
        DashboardGate::Redirect(path) => {
            bail!("Finish signing up at {}", globals.page(path)?)
        }
    };

    match board.profile.greeting_name() {
        Some(name) => println!("Welcome, {name}!"),
        None => println!("Welcome!"),
    }
    if let Some(email) = board.user.email.as_deref() {
        println!("Signed in as {email}");
    }

    if board.connections.is_empty() {
        println!("No devices connected yet.");
    } else {
        println!("Connected devices:");
        for connection in &board.connections {
            match connection.last_sync.as_deref() {
                Some(at) => println!("  {} (last sync {at})", connection.device_label()),
                None => println!("  {}", connection.device_label()),
            }
        }
    }

    Ok(())
}
