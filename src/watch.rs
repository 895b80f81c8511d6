//! One notification stream for "has the email been confirmed?".
//!
//! A [`ConfirmationWatch`] merges every push transport of a
//! [`ConfirmationBus`] (storage events, broadcast messages, opener messages)
//! with a periodic poll of persisted signals. Callers just loop on
//! [`ConfirmationWatch::next`]. Stale signals never reach the caller.

use crate::signal::{ConfirmationBus, Observed, SignalSource};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// End the stream after the first fresh confirmation.
    #[default]
    UntilConfirmed,
    /// Keep yielding confirmations until dropped.
    Continuous,
}

pub struct ConfirmationWatch {
    bus: ConfirmationBus,
    poll_interval: Duration,
    mode: WatchMode,
    receiver: mpsc::UnboundedReceiver<Observed>,
    forwarders: Vec<JoinHandle<()>>,
    poll: Interval,
    finished: bool,
}

impl ConfirmationWatch {
    /// Start watching. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(bus: ConfirmationBus, poll_interval: Duration, mode: WatchMode) -> Self {
        let (receiver, forwarders) = Self::attach(&bus);
        Self {
            poll: Self::poll_timer(poll_interval),
            bus,
            poll_interval,
            mode,
            receiver,
            forwarders,
            finished: false,
        }
    }

    fn attach(bus: &ConfirmationBus) -> (mpsc::UnboundedReceiver<Observed>, Vec<JoinHandle<()>>) {
        let (sink, receiver) = mpsc::unbounded_channel();
        let forwarders = bus.subscribe_all(&sink);
        (receiver, forwarders)
    }

    fn poll_timer(period: Duration) -> Interval {
        let mut poll = interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next fresh confirmation, or `None` once a finite watch has ended.
    /// The first poll happens immediately.
    pub async fn next(&mut self) -> Option<Observed> {
        loop {
            if self.finished {
                return None;
            }

            let observed = tokio::select! {
                Some(observed) = self.receiver.recv() => {
                    if self.bus.is_fresh(&observed.signal) {
                        // Consumed: drop any persisted copy so no tab acts on it twice.
                        self.bus.clear();
                        Some(observed)
                    } else {
                        debug!("Discarding stale confirmation from {:?}", observed.source);
                        self.bus.clear();
                        None
                    }
                }
                _ = self.poll.tick() => {
                    self.bus.take_fresh().map(|signal| Observed {
                        source: SignalSource::Poll,
                        signal,
                    })
                }
            };

            if let Some(observed) = observed {
                if self.mode == WatchMode::UntilConfirmed {
                    self.stop();
                }
                return Some(observed);
            }
        }
    }

    /// Re-subscribe to every transport and reset the poll timer, reviving a
    /// finished watch.
    pub fn restart(&mut self) {
        self.abort_forwarders();
        let (receiver, forwarders) = Self::attach(&self.bus);
        self.receiver = receiver;
        self.forwarders = forwarders;
        self.poll = Self::poll_timer(self.poll_interval);
        self.finished = false;
    }

    fn stop(&mut self) {
        self.finished = true;
        self.abort_forwarders();
    }

    fn abort_forwarders(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }
}

impl Drop for ConfirmationWatch {
    fn drop(&mut self) {
        self.abort_forwarders();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signal::clock::ManualClock;
    use crate::signal::{
        store, ChannelHub, ChannelTransport, Clock, ConfirmationSignal, KeyValueStore, MemoryStore,
        SignalMessage, SignalTransport, StorageTransport,
    };
    use std::sync::Arc;
    use tokio::time::timeout;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        hub: ChannelHub,
        bus: ConfirmationBus,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryStore::new());
        let hub = ChannelHub::new();
        let bus = ConfirmationBus::new(clock.clone(), Duration::from_secs(30))
            .with_transport(Arc::new(StorageTransport::new(store.clone())))
            .with_transport(Arc::new(ChannelTransport::new(
                hub.open("auth_channel"),
                clock.clone(),
            )));
        Fixture {
            clock,
            store,
            hub,
            bus,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_picks_up_signal_written_before_watching() {
        let f = fixture();
        f.bus.publish(false);

        let mut watch =
            ConfirmationWatch::new(f.bus.clone(), Duration::from_secs(2), WatchMode::UntilConfirmed);
        let observed = watch.next().await.unwrap();

        assert_eq!(observed.source, SignalSource::Poll);
        assert!(watch.is_finished());
        assert!(watch.next().await.is_none());
        assert_eq!(f.store.get(store::CONFIRMED_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_signal_is_ignored_and_cleared() {
        let f = fixture();
        f.bus.publish(false);
        f.clock.advance(Duration::from_secs(31));

        let mut watch =
            ConfirmationWatch::new(f.bus.clone(), Duration::from_secs(2), WatchMode::UntilConfirmed);
        let result = timeout(Duration::from_secs(10), watch.next()).await;

        assert!(result.is_err(), "stale signal must not be honored");
        assert_eq!(f.store.get(store::TIMESTAMP_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn channel_message_wakes_the_watch() {
        let f = fixture();
        let mut watch =
            ConfirmationWatch::new(f.bus.clone(), Duration::from_secs(3600), WatchMode::Continuous);
        // Let the immediate first poll pass.
        assert!(timeout(Duration::from_millis(50), watch.next()).await.is_err());

        f.hub.open("auth_channel").post(SignalMessage::email_confirmed());
        let observed = timeout(Duration::from_secs(5), watch.next()).await.unwrap().unwrap();

        assert_eq!(observed.source, SignalSource::Channel);
        assert!(!watch.is_finished());
    }

    #[tokio::test]
    async fn storage_event_wakes_the_watch() {
        let f = fixture();
        let mut watch = ConfirmationWatch::new(
            f.bus.clone(),
            Duration::from_secs(3600),
            WatchMode::UntilConfirmed,
        );
        assert!(timeout(Duration::from_millis(50), watch.next()).await.is_err());

        // Another tab writes the storage flag directly.
        let other_tab = StorageTransport::new(f.store.clone());
        other_tab
            .publish(&ConfirmationSignal {
                confirmed_at_ms: f.clock.now_millis(),
                optimistic: false,
            })
            .unwrap();

        let observed = timeout(Duration::from_secs(5), watch.next()).await.unwrap().unwrap();
        assert_eq!(observed.source, SignalSource::Storage);
        assert!(watch.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_revives_a_finished_watch() {
        let f = fixture();
        f.bus.publish(false);

        let mut watch =
            ConfirmationWatch::new(f.bus.clone(), Duration::from_secs(2), WatchMode::UntilConfirmed);
        assert!(watch.next().await.is_some());
        assert!(watch.next().await.is_none());

        watch.restart();
        f.bus.publish(false);
        let observed = watch.next().await.unwrap();
        assert!(matches!(
            observed.source,
            SignalSource::Poll | SignalSource::Storage | SignalSource::Channel
        ));
    }
}
