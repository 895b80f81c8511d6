//! Messages between a window and the window that opened it.
//!
//! [`window_pair`] returns both ends: the [`WindowOpener`] handle held by the
//! opened page (where the confirmation link landed) and the [`OpenerListener`]
//! transport used by the opening page (where the user is waiting).

use super::{
    Clock, ConfirmationSignal, Observed, SignalError, SignalMessage, SignalSink, SignalSource,
    SignalTransport,
};
use std::sync::Arc;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::debug;

const OPENER_CAPACITY: usize = 8;

/// Handle to the opening window, as seen by the opened page.
pub trait Opener: Send + Sync {
    /// Post `message`, restricted to receivers on `target_origin` (`*` for any).
    ///
    /// # Errors
    /// Returns an error when the opening window is gone.
    fn post_message(&self, message: &SignalMessage, target_origin: &str) -> Result<(), SignalError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub message: SignalMessage,
    pub target_origin: String,
}

#[derive(Clone, Debug)]
pub struct WindowOpener {
    sender: broadcast::Sender<PostedMessage>,
}

impl Opener for WindowOpener {
    fn post_message(&self, message: &SignalMessage, target_origin: &str) -> Result<(), SignalError> {
        self.sender
            .send(PostedMessage {
                message: message.clone(),
                target_origin: target_origin.to_string(),
            })
            .map(|_| ())
            .map_err(|_| SignalError::OpenerClosed)
    }
}

/// Receiving end living in the opening window at `origin`.
#[derive(Clone)]
pub struct OpenerListener {
    sender: broadcast::Sender<PostedMessage>,
    origin: String,
    clock: Arc<dyn Clock>,
}

impl OpenerListener {
    fn accepts(&self, posted: &PostedMessage) -> bool {
        posted.target_origin == "*" || posted.target_origin == self.origin
    }
}

/// Create a connected opener handle and listener for a window at `origin`.
#[must_use]
pub fn window_pair(origin: &str, clock: Arc<dyn Clock>) -> (WindowOpener, OpenerListener) {
    let (sender, _) = broadcast::channel(OPENER_CAPACITY);
    (
        WindowOpener {
            sender: sender.clone(),
        },
        OpenerListener {
            sender,
            origin: origin.to_string(),
            clock,
        },
    )
}

impl SignalTransport for OpenerListener {
    fn source(&self) -> SignalSource {
        SignalSource::Opener
    }

    // The opening window only listens; it has no opener of its own to notify.
    fn publish(&self, _signal: &ConfirmationSignal) -> Result<(), SignalError> {
        Ok(())
    }

    fn subscribe(&self, sink: SignalSink) -> Option<JoinHandle<()>> {
        let mut messages = self.sender.subscribe();
        let listener = self.clone();

        Some(tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(posted) if !listener.accepts(&posted) => {
                        debug!(
                            "Ignoring opener message for origin {}",
                            posted.target_origin
                        );
                    }
                    Ok(posted) if posted.message.is_confirmation() => {
                        let observed = Observed {
                            source: SignalSource::Opener,
                            signal: ConfirmationSignal {
                                confirmed_at_ms: listener.clock.now_millis(),
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
