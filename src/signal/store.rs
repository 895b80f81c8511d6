//! Key-value storage shared between tabs, and the signal transport on top of it.
//!
//! Values are plain strings, like browser local storage. [`MemoryStore`] lives
//! in one process and pushes change events to subscribers; [`FileStore`] is a
//! JSON file shared between processes and can only be polled.

use super::{ConfirmationSignal, Observed, SignalError, SignalSink, SignalSource, SignalTransport};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

pub const CONFIRMED_KEY: &str = "email_confirmed";
pub const TIMESTAMP_KEY: &str = "email_confirmed_timestamp";
pub const ATTEMPTED_KEY: &str = "email_confirmation_attempted";

const EVENT_CAPACITY: usize = 64;
const STORE_FILE: &str = "storage.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A change to one key. `new_value` is `None` on removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns an error if the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// # Errors
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Change notifications, when the store can push them.
    fn events(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            values: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.values.write().remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn events(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.events.subscribe())
    }
}

/// JSON object of string values in `<dir>/storage.json`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) the store directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(STORE_FILE),
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        // Write then rename so readers in other processes never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock();
        let mut values = self.load()?;
        if apply(&mut values) {
            self.save(&values)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|values| values.remove(key).is_some())
    }
}

/// Confirmation signal stored as `email_confirmed` / `email_confirmed_timestamp`.
#[derive(Clone)]
pub struct StorageTransport {
    store: Arc<dyn KeyValueStore>,
}

impl StorageTransport {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

fn read_signal(store: &dyn KeyValueStore) -> Result<Option<ConfirmationSignal>, StoreError> {
    if store.get(CONFIRMED_KEY)?.as_deref() != Some("true") {
        return Ok(None);
    }

    // The flag lands before the timestamp; until both are there nothing is
    // published yet, and nothing may be cleared.
    let Some(raw) = store.get(TIMESTAMP_KEY)? else {
        return Ok(None);
    };
    // An unreadable timestamp cannot be aged; treat it as ancient.
    let confirmed_at_ms = raw.trim().parse::<u64>().unwrap_or(0);
    let optimistic = store.get(ATTEMPTED_KEY)?.as_deref() == Some("true");

    Ok(Some(ConfirmationSignal {
        confirmed_at_ms,
        optimistic,
    }))
}

impl SignalTransport for StorageTransport {
    fn source(&self) -> SignalSource {
        SignalSource::Storage
    }

    fn publish(&self, signal: &ConfirmationSignal) -> Result<(), SignalError> {
        if signal.optimistic {
            self.store.set(ATTEMPTED_KEY, "true")?;
        }
        self.store.set(CONFIRMED_KEY, "true")?;
        // Written last: listeners react to the timestamp key.
        self.store
            .set(TIMESTAMP_KEY, &signal.confirmed_at_ms.to_string())?;
        Ok(())
    }

    fn latest(&self) -> Result<Option<ConfirmationSignal>, SignalError> {
        Ok(read_signal(self.store.as_ref())?)
    }

    fn clear(&self) -> Result<(), SignalError> {
        self.store.remove(CONFIRMED_KEY)?;
        self.store.remove(TIMESTAMP_KEY)?;
        self.store.remove(ATTEMPTED_KEY)?;
        Ok(())
    }

    fn subscribe(&self, sink: SignalSink) -> Option<JoinHandle<()>> {
        let mut events = self.store.events()?;
        let store = self.store.clone();

        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.key == TIMESTAMP_KEY && event.new_value.is_some() => {
                        match read_signal(store.as_ref()) {
                            Ok(Some(signal)) => {
                                let observed = Observed {
                                    source: SignalSource::Storage,
                                    signal,
                                };
                                if sink.send(observed).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(err) => warn!("Failed to read confirmation after storage event: {err}"),
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Storage listener lagged, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}
