use crate::{
    cli::{actions::Context, globals::GlobalArgs},
    dashboard::return_destination,
    resolver::{ResolutionStatus, SessionResolver},
};
use anyhow::{bail, Result};
use tracing::{info, instrument};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub link: Url,
}

/// Resolve a session from the landing location of a confirmation link.
/// # Errors
/// Returns an error if no session could be established.
#[instrument(skip_all)]
pub async fn execute(args: Args) -> Result<()> {
    let context = Context::new(&args.globals)?;
    let origin = args.globals.client_config().site_origin();

    let auth = context.auth.clone();
    let resolver = SessionResolver::new(context.auth, context.bus, origin, context.flow);
    let outcome = resolver.resolve(&args.link).await;

    println!("{}", outcome.visible_url);

    match outcome.status {
        ResolutionStatus::Success => {
            info!("Confirmation resolved with {:?}", outcome.strategy);
            println!("Email confirmed! You can return to the other window.");
            println!(
                "Or continue here: {}",
                args.globals.page(return_destination(&*auth).await)?
            );
            Ok(())
        }
        ResolutionStatus::Error(message) => bail!(message),
        ResolutionStatus::Processing => bail!("Confirmation did not complete"),
    }
}
