pub mod account;
pub mod confirm;
pub mod wait;

mod context;
// The match over `Action` lives in its own module so this one stays small.
mod run;

pub use self::context::Context;

use crate::cli::globals::GlobalArgs;

#[derive(Debug)]
pub enum Action {
    SignUp(account::SignUpArgs),
    SignIn(account::SignInArgs),
    SignOut(GlobalArgs),
    WhoAmI(GlobalArgs),
    Dashboard(GlobalArgs),
    Confirm(confirm::Args),
    Wait(wait::Args),
    Resend(wait::ResendArgs),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
