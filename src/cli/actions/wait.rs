use crate::{
    auth::AuthService,
    cli::{actions::Context, globals::GlobalArgs},
    forms,
    waiting::{Navigator, ResendError, WaitingPage, WaitingState},
};
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tracing::{debug, instrument};
use url::Url;

const RESENT_MESSAGE: &str = "Confirmation email sent! Please check your inbox.";

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    /// Location the waiting page was opened at.
    pub location: Url,
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct ResendArgs {
    pub globals: GlobalArgs,
    pub email: String,
}

/// Prints where the user goes next.
struct ConsoleNavigator {
    globals: GlobalArgs,
}

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str) {
        match self.globals.page(path) {
            Ok(url) => println!("Continue at {url}"),
            Err(_) => println!("Continue at {path}"),
        }
    }
}

fn describe(state: &WaitingState) -> Option<String> {
    match state {
        WaitingState::Checking => None,
        WaitingState::Waiting { email: Some(email) } => Some(format!(
            "Waiting for {email} to be confirmed. Type `r` and Enter to resend the email."
        )),
        WaitingState::Waiting { email: None } => Some(
            "Waiting for the email to be confirmed. Type `r` and Enter to resend the email."
                .to_string(),
        ),
        WaitingState::Error(message) => Some(message.clone()),
        WaitingState::Confirmed => Some("Email confirmed! Redirecting...".to_string()),
    }
}

/// Run the page while reading `input`; a line `r` starts a resend. Resends run
/// beside the page so a slow request never holds up confirmation.
async fn drive<R>(
    page: Arc<WaitingPage>,
    location: &Url,
    email: Option<String>,
    input: R,
) -> WaitingState
where
    R: AsyncBufRead + Unpin,
{
    let run = page.run(location);
    tokio::pin!(run);

    let mut lines = input.lines();
    let mut input_open = true;
    let mut resends = JoinSet::new();

    let state = loop {
        tokio::select! {
            state = &mut run => break state,
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("r") => {
                    let page = page.clone();
                    let email = email.clone();
                    resends.spawn(async move {
                        match page.resend(email.as_deref()).await {
                            Ok(()) => println!("{RESENT_MESSAGE}"),
                            Err(err) => println!("{err}"),
                        }
                    });
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    debug!("input closed, resends disabled");
                    input_open = false;
                }
            },
            Some(_) = resends.join_next(), if !resends.is_empty() => {}
        }
    };

    resends.abort_all();
    state
}

/// Follow the waiting page until the email is confirmed, resending on request.
/// # Errors
/// Returns an error if the page ends in an error state.
#[instrument(skip_all)]
pub async fn execute(args: Args) -> Result<()> {
    let context = Context::new(&args.globals)?;
    let navigator = Arc::new(ConsoleNavigator {
        globals: args.globals.clone(),
    });
    let page = Arc::new(WaitingPage::new(
        context.auth,
        context.bus,
        navigator,
        context.flow,
    ));

    let mut states = page.state();
    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            if let Some(line) = describe(&state) {
                println!("{line}");
            }
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let state = drive(page, &args.location, args.email, input).await;

    printer.abort();

    match state {
        WaitingState::Error(message) => bail!(message),
        _ => Ok(()),
    }
}

/// Resend the confirmation email outside a waiting page.
/// # Errors
/// Returns an error if the address is invalid or the service rejects the request.
#[instrument(skip_all)]
pub async fn resend(args: ResendArgs) -> Result<()> {
    let email = args.email.trim();
    if !forms::valid_email(email) {
        bail!(ResendError::InvalidEmail);
    }

    let context = Context::new(&args.globals)?;
    context
        .auth
        .resend_confirmation(email)
        .await
        .map_err(|err| anyhow!(ResendError::Failed(err)))?;

    println!("{RESENT_MESSAGE}");
    Ok(())
}
