//! Named in-process broadcast channels, the analogue of `BroadcastChannel`.

use super::{
    Clock, ConfirmationSignal, Observed, SignalError, SignalMessage, SignalSink, SignalSource,
    SignalTransport,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 16;

/// Registry handing out channels by name; every handle with the same name
/// talks to the same subscribers.
#[derive(Clone, Debug, Default)]
pub struct ChannelHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<SignalMessage>>>>,
}

impl ChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn open(&self, name: &str) -> BroadcastChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();

        BroadcastChannel {
            name: name.to_string(),
            sender,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BroadcastChannel {
    name: String,
    sender: broadcast::Sender<SignalMessage>,
}

impl BroadcastChannel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post to every current subscriber. Returns how many received it.
    pub fn post(&self, message: SignalMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SignalMessage> {
        self.sender.subscribe()
    }
}

/// Confirmation signal carried as a [`SignalMessage`] on a named channel.
/// Messages are not persisted, so a received message is stamped on arrival.
#[derive(Clone)]
pub struct ChannelTransport {
    channel: BroadcastChannel,
    clock: Arc<dyn Clock>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(channel: BroadcastChannel, clock: Arc<dyn Clock>) -> Self {
        Self { channel, clock }
    }
}

impl SignalTransport for ChannelTransport {
    fn source(&self) -> SignalSource {
        SignalSource::Channel
    }

    fn publish(&self, _signal: &ConfirmationSignal) -> Result<(), SignalError> {
        let delivered = self.channel.post(SignalMessage::email_confirmed());
        debug!(
            "Posted confirmation on channel {} to {delivered} listeners",
            self.channel.name()
        );
        Ok(())
    }

    fn subscribe(&self, sink: SignalSink) -> Option<JoinHandle<()>> {
        let mut messages = self.channel.subscribe();
        let clock = self.clock.clone();

        Some(tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) if message.is_confirmation() => {
                        let observed = Observed {
                            source: SignalSource::Channel,
                            signal: ConfirmationSignal {
                                confirmed_at_ms: clock.now_millis(),
                                optimistic: false,
                            },
                        };
                        if sink.send(observed).is_err() {
                            break;
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
