use crate::cli::actions::{account, confirm, wait, Action};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::SignUp(args) => account::sign_up(args).await,
        Action::SignIn(args) => account::sign_in(args).await,
        Action::SignOut(globals) => account::sign_out(&globals).await,
        Action::WhoAmI(globals) => account::whoami(&globals).await,
        Action::Dashboard(globals) => account::dashboard(&globals).await,
        Action::Confirm(args) => confirm::execute(args).await,
        Action::Wait(args) => wait::execute(args).await,
        Action::Resend(args) => wait::resend(args).await,
    }
}
