//! Cross-tab confirmation signal.
//!
//! A tab that confirms an email publishes a [`ConfirmationSignal`] on the
//! [`ConfirmationBus`]; sibling tabs observe it through one or more
//! [`SignalTransport`]s:
//!
//! - [`StorageTransport`]: two plain-string keys in a [`KeyValueStore`]
//!   (`email_confirmed`, `email_confirmed_timestamp`), read by polling or by
//!   storage change events.
//! - [`ChannelTransport`]: a named [`BroadcastChannel`] carrying
//!   [`SignalMessage`]s.
//! - [`OpenerListener`]: messages posted by a window this tab opened.
//!
//! Signals expire after the bus TTL. A stale signal is never honored and is
//! cleared from every transport when observed.

pub mod channel;
pub mod clock;
pub mod opener;
pub mod store;

pub use self::channel::{BroadcastChannel, ChannelHub, ChannelTransport};
pub use self::clock::{Clock, SystemClock};
pub use self::opener::{window_pair, Opener, OpenerListener, PostedMessage, WindowOpener};
pub use self::store::{FileStore, KeyValueStore, MemoryStore, StorageEvent, StorageTransport, StoreError};

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

/// Message exchanged between windows: `{"type":"EMAIL_CONFIRMED","success":true}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalMessage {
    EmailConfirmed { success: bool },
}

impl SignalMessage {
    #[must_use]
    pub fn email_confirmed() -> Self {
        Self::EmailConfirmed { success: true }
    }

    #[must_use]
    pub fn is_confirmation(&self) -> bool {
        matches!(self, Self::EmailConfirmed { success: true })
    }
}

/// A confirmation observed or published at `confirmed_at_ms` (unix millis).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationSignal {
    pub confirmed_at_ms: u64,
    /// Set when the publisher could not verify the confirmation itself.
    pub optimistic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalSource {
    Storage,
    Channel,
    Opener,
    Poll,
}

/// A signal together with the transport that delivered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observed {
    pub source: SignalSource,
    pub signal: ConfirmationSignal,
}

pub type SignalSink = mpsc::UnboundedSender<Observed>;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("opener window is closed")]
    OpenerClosed,
}

/// One way of carrying the confirmation signal between tabs.
pub trait SignalTransport: Send + Sync {
    fn source(&self) -> SignalSource;

    /// Make `signal` visible to other tabs.
    ///
    /// # Errors
    /// Returns an error if the underlying medium rejects the write.
    fn publish(&self, signal: &ConfirmationSignal) -> Result<(), SignalError>;

    /// Last persisted signal, for transports that keep one.
    ///
    /// # Errors
    /// Returns an error if the underlying medium cannot be read.
    fn latest(&self) -> Result<Option<ConfirmationSignal>, SignalError> {
        Ok(None)
    }

    /// Forget any persisted signal.
    ///
    /// # Errors
    /// Returns an error if the underlying medium rejects the removal.
    fn clear(&self) -> Result<(), SignalError> {
        Ok(())
    }

    /// Forward pushed signals into `sink` until the transport closes.
    /// Returns `None` for transports that can only be polled.
    fn subscribe(&self, sink: SignalSink) -> Option<JoinHandle<()>>;
}

/// Publishes and observes confirmation signals over a set of transports.
#[derive(Clone)]
pub struct ConfirmationBus {
    transports: Vec<Arc<dyn SignalTransport>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ConfirmationBus {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            transports: Vec::new(),
            clock,
            ttl,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn SignalTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Publish a confirmation stamped with the current time on every transport.
    /// Failures are logged; the signal is best effort.
    pub fn publish(&self, optimistic: bool) -> ConfirmationSignal {
        let signal = ConfirmationSignal {
            confirmed_at_ms: self.clock.now_millis(),
            optimistic,
        };

        for transport in &self.transports {
            if let Err(err) = transport.publish(&signal) {
                warn!(
                    "Failed to publish confirmation via {:?}: {err}",
                    transport.source()
                );
            }
        }

        signal
    }

    /// A signal is fresh while its age is strictly below the TTL. Timestamps
    /// in the future count as age zero.
    #[must_use]
    pub fn is_fresh(&self, signal: &ConfirmationSignal) -> bool {
        let age_ms = self.clock.now_millis().saturating_sub(signal.confirmed_at_ms);
        u128::from(age_ms) < self.ttl.as_millis()
    }

    /// Read persisted signals, consuming the first fresh one. Stale signals are
    /// cleared along the way.
    #[must_use]
    pub fn take_fresh(&self) -> Option<ConfirmationSignal> {
        let mut found = None;
        let mut stale = false;

        for transport in &self.transports {
            match transport.latest() {
                Ok(Some(signal)) if self.is_fresh(&signal) => {
                    found = Some(signal);
                    break;
                }
                Ok(Some(signal)) => {
                    debug!(
                        "Discarding stale confirmation from {:?} written at {}",
                        transport.source(),
                        signal.confirmed_at_ms
                    );
                    stale = true;
                }
                Ok(None) => {}
                Err(err) => warn!("Failed to read confirmation via {:?}: {err}", transport.source()),
            }
        }

        if found.is_some() || stale {
            self.clear();
        }

        found
    }

    /// Remove persisted signals from every transport.
    pub fn clear(&self) {
        for transport in &self.transports {
            if let Err(err) = transport.clear() {
                warn!(
                    "Failed to clear confirmation via {:?}: {err}",
                    transport.source()
                );
            }
        }
    }

    pub(crate) fn subscribe_all(&self, sink: &SignalSink) -> Vec<JoinHandle<()>> {
        self.transports
            .iter()
            .filter_map(|transport| transport.subscribe(sink.clone()))
            .collect()
    }
}

impl std::fmt::Debug for ConfirmationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationBus")
            .field(
                "transports",
                &self
                    .transports
                    .iter()
                    .map(|transport| transport.source())
                    .collect::<Vec<_>>(),
            )
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::clock::ManualClock;
    use super::*;

    fn bus_with_store(clock: &Arc<ManualClock>) -> (ConfirmationBus, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let bus = ConfirmationBus::new(clock.clone(), Duration::from_secs(30))
            .with_transport(Arc::new(StorageTransport::new(store.clone())));
        (bus, store)
    }

    #[test]
    fn message_schema() {
        let json = serde_json::to_value(SignalMessage::email_confirmed()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "EMAIL_CONFIRMED", "success": true}));

        let parsed: SignalMessage =
            serde_json::from_str(r#"{"type":"EMAIL_CONFIRMED","success":false}"#).unwrap();
        assert!(!parsed.is_confirmation());
    }

    #[test]
    fn publish_writes_flag_and_timestamp() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let (bus, store) = bus_with_store(&clock);

        let signal = bus.publish(false);

        assert_eq!(signal.confirmed_at_ms, 1_700_000_000_000);
        assert_eq!(
            store.get(store::CONFIRMED_KEY).unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(
            store.get(store::TIMESTAMP_KEY).unwrap().as_deref(),
            Some("1700000000000")
        );
        assert_eq!(store.get(store::ATTEMPTED_KEY).unwrap(), None);
    }

    #[test]
    fn signal_is_honored_before_ttl_and_consumed() {
        let clock = Arc::new(ManualClock::new(10_000));
        let (bus, store) = bus_with_store(&clock);
        bus.publish(false);

        clock.advance(Duration::from_millis(29_999));
        let taken = bus.take_fresh().unwrap();
        assert_eq!(taken.confirmed_at_ms, 10_000);
        assert_eq!(store.get(store::CONFIRMED_KEY).unwrap(), None);
        assert!(bus.take_fresh().is_none());
    }

    #[test]
    fn signal_at_ttl_is_stale_and_cleared() {
        let clock = Arc::new(ManualClock::new(10_000));
        let (bus, store) = bus_with_store(&clock);
        bus.publish(false);

        clock.advance(Duration::from_secs(30));
        assert!(bus.take_fresh().is_none());
        assert_eq!(store.get(store::CONFIRMED_KEY).unwrap(), None);
        assert_eq!(store.get(store::TIMESTAMP_KEY).unwrap(), None);
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let clock = Arc::new(ManualClock::new(10_000));
        let (bus, _) = bus_with_store(&clock);
        assert!(bus.is_fresh(&ConfirmationSignal {
            confirmed_at_ms: 20_000,
            optimistic: false,
        }));
    }
}
