//! Window identity bound to a session.
//!
//! A session is what survives a reload of the same window but is never shared
//! with another window: a browser tab's session storage, or a named session
//! file for a window process.

use crate::{paths, HostError};
use multiwin_core::WindowId;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

/// Session key holding the window id.
pub const WINDOW_ID_KEY: &str = "multiwin.window_id";

/// Per-session key-value storage.
pub trait SessionStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), HostError>;
}

impl<T: SessionStorage + ?Sized> SessionStorage for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        (**self).set(key, value)
    }
}

/// Session storage held in memory. Clones share the same session.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Session storage in `<data_dir>/sessions/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(data_dir: &Path, session: &str) -> Self {
        Self {
            path: paths::sessions_dir(data_dir).join(format!("{}.json", session)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        match fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Ignoring malformed session file {}: {}", self.path.display(), e);
                HashMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {}", self.path.display(), e);
                HashMap::new()
            }
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut values = self.load();
        values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        Ok(())
    }
}

/// Hands out the id of the current window session.
pub struct IdentityStore<S> {
    storage: S,
    id: OnceLock<WindowId>,
}

impl<S: SessionStorage> IdentityStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            id: OnceLock::new(),
        }
    }

    /// The id bound to this session, generating one on first use.
    ///
    /// If the session cannot be persisted the id still holds for the lifetime
    /// of this store; only a reload would then get a new one.
    pub fn get_or_create_id(&self) -> WindowId {
        self.id
            .get_or_init(|| {
                if let Some(existing) = self.storage.get(WINDOW_ID_KEY).filter(|s| !s.is_empty()) {
                    debug!("Resuming session as window {}", existing);
                    return WindowId::new(existing);
                }
                let id = WindowId::new(uuid::Uuid::new_v4().to_string());
                if let Err(e) = self.storage.set(WINDOW_ID_KEY, id.as_str()) {
                    warn!("Failed to persist window id {}: {}", id, e);
                }
                id
            })
            .clone()
    }
}
