use crate::{
    auth::GoTrueClient,
    cli::globals::GlobalArgs,
    config::FlowConfig,
    signal::{
        ChannelHub, ChannelTransport, Clock, ConfirmationBus, FileStore, StorageTransport,
        SystemClock,
    },
};
use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::debug;

/// Services wired from the global arguments.
///
/// The storage directory plays the part of browser local storage: every `arx`
/// process pointed at it shares the session and the confirmation flags.
pub struct Context {
    pub store: Arc<FileStore>,
    pub auth: Arc<GoTrueClient>,
    pub bus: ConfirmationBus,
    pub flow: FlowConfig,
}

impl Context {
    /// # Errors
    /// Returns an error if the storage directory or the HTTP client cannot be set up.
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let store = Arc::new(FileStore::open(&globals.storage_dir).with_context(|| {
            format!(
                "Failed to open storage directory {}",
                globals.storage_dir.display()
            )
        })?);
        debug!("Using storage file {}", store.path().display());

        let auth = Arc::new(
            GoTrueClient::new(globals.client_config(), store.clone())
                .context("Failed to build auth client")?,
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let flow = globals.flow.clone();
        let hub = ChannelHub::new();
        let bus = ConfirmationBus::new(clock.clone(), flow.signal_ttl())
            .with_transport(Arc::new(StorageTransport::new(store.clone())))
            .with_transport(Arc::new(ChannelTransport::new(
                hub.open(flow.channel_name()),
                clock,
            )));

        Ok(Self {
            store,
            auth,
            bus,
            flow,
        })
    }
}
