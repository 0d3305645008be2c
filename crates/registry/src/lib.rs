//! multiwin Registry
//!
//! The shared registry every window of one origin reads and writes.
//!
//! The registry is a single key in a [`SharedStore`]. Its value is a JSON
//! [`RegistrySnapshot`] that is always read and written whole. Stores notify
//! every *other* execution context when the key changes; the writer itself is
//! never notified.
//!
//! There is no compare-and-swap. Two windows doing read-modify-write at the
//! same time can lose an update; callers re-derive state on their next refresh.

pub mod file;
pub mod memory;

pub use file::{default_data_dir, FileStore};
pub use memory::{MemoryOrigin, MemoryStore};

use multiwin_core::{DisplayConfig, RegistrySnapshot, SnapshotError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Store key holding the registry snapshot.
pub const REGISTRY_KEY: &str = "multiwin.registry";

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Store unavailable")]
    Unavailable,
}

/// Errors raised when writing the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Notification that another context wrote a key.
///
/// Carries only the key. Receivers must re-read the store rather than trust
/// anything about the new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// Receiving end of a store subscription.
pub type ChangeReceiver = mpsc::UnboundedReceiver<StoreChange>;

/// A persistent key-value store shared by every context of one origin.
///
/// Each `get`/`set` is atomic on its own; nothing composes them.
pub trait SharedStore {
    /// Read the value of a key, `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value of a key. Other contexts subscribed to it are notified.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove every key. Other contexts subscribed to a removed key are notified.
    fn clear(&self) -> Result<(), StoreError>;

    /// Subscribe to writes of `key` made by other contexts.
    fn subscribe(&self, key: &str) -> ChangeReceiver;
}

/// Typed access to the registry key of a store.
#[derive(Debug, Clone)]
pub struct Registry<S> {
    store: S,
    key: String,
    defaults: DisplayConfig,
}

impl<S: SharedStore> Registry<S> {
    /// Registry on [`REGISTRY_KEY`] with the given built-in display defaults.
    pub fn new(store: S, defaults: DisplayConfig) -> Self {
        Self::with_key(store, REGISTRY_KEY, defaults)
    }

    pub fn with_key(store: S, key: impl Into<String>, defaults: DisplayConfig) -> Self {
        Self {
            store,
            key: key.into(),
            defaults,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Built-in configuration used when nothing has been written yet.
    pub fn defaults(&self) -> &DisplayConfig {
        &self.defaults
    }

    /// The empty snapshot: no windows, default configuration.
    pub fn empty_snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::empty(self.defaults.clone())
    }

    /// Read the current snapshot.
    ///
    /// Never fails: a missing, unreadable or malformed value yields the empty
    /// snapshot.
    pub fn read(&self) -> RegistrySnapshot {
        match self.store.get(&self.key) {
            Ok(Some(json)) => match RegistrySnapshot::from_json(&json) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Ignoring malformed registry value: {}", e);
                    self.empty_snapshot()
                }
            },
            Ok(None) => self.empty_snapshot(),
            Err(e) => {
                warn!("Failed to read registry: {}", e);
                self.empty_snapshot()
            }
        }
    }

    /// Replace the stored snapshot in full.
    pub fn write(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        let json = snapshot.to_json()?;
        self.store.set(&self.key, &json)?;
        debug!(
            "Wrote registry: {} window(s), {} bytes",
            snapshot.windows.len(),
            json.len()
        );
        Ok(())
    }

    /// Overwrite the registry with the empty snapshot and return it.
    pub fn reset(&self) -> Result<RegistrySnapshot, RegistryError> {
        let empty = self.empty_snapshot();
        self.write(&empty)?;
        Ok(empty)
    }

    /// Subscribe to registry writes made by other contexts.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.store.subscribe(&self.key)
    }
}
