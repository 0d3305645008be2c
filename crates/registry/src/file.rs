//! Directory-backed store shared by window processes on one machine.
//!
//! Every key is one `<key>.json` file. Writes go through a temporary file and a
//! rename, so readers see either the old or the new value. Other processes'
//! writes are picked up with a `notify` watcher on the store directory; each
//! event for a key's file is checked against the last value seen and the last
//! value this handle wrote itself, so only real foreign changes are reported.

use crate::{ChangeReceiver, SharedStore, StoreChange, StoreError};
use directories::ProjectDirs;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const VALUE_EXTENSION: &str = "json";

/// Base directory for multiwin state (store, sessions, presence).
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "multiwin", "multiwin")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("multiwin-data"))
}

/// Last value this handle wrote per key. `None` marks a key it removed.
type Written = Arc<Mutex<HashMap<String, Option<String>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A live watcher feeding one subscription.
struct Subscription {
    sender: mpsc::UnboundedSender<StoreChange>,
    _watcher: RecommendedWatcher,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// A [`SharedStore`] kept in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    written: Written,
    /// Watchers stay alive as long as the store handle and their receiver.
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl FileStore {
    /// Open (and create if needed) a store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, VALUE_EXTENSION))
    }

    fn remember_write(&self, key: &str, value: Option<&str>) {
        lock(&self.written).insert(key.to_string(), value.map(str::to_string));
    }

    fn watch(
        &self,
        key: &str,
        sender: mpsc::UnboundedSender<StoreChange>,
    ) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path_for(key);
        let file_name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let key = key.to_string();
        let written = Arc::clone(&self.written);
        let mut last_seen = read_value(&path).ok().flatten();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Store watcher error: {}", e);
                        return;
                    }
                };
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                let is_our_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|n| n == file_name));
                if !relevant || !is_our_file {
                    return;
                }

                let current = match read_value(&path) {
                    Ok(current) => current,
                    Err(e) => {
                        debug!("Read of {} failed: {}", path.display(), e);
                        return;
                    }
                };
                if current == last_seen {
                    return;
                }
                let own = lock(&written).get(&key) == Some(&current);
                last_seen = current;
                if own {
                    return;
                }
                debug!("Store key {} changed on disk", key);
                let _ = sender.send(StoreChange { key: key.clone() });
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

fn read_value(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl SharedStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        read_value(&self.path_for(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, std::process::id()));
        fs::write(&tmp, value)?;
        // Remembered before the rename so our own watcher event is recognised
        self.remember_write(key, Some(value));
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                self.remember_write(key, None);
            }
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> ChangeReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        match self.watch(key, sender.clone()) {
            Ok(watcher) => {
                let mut subscriptions = lock(&self.subscriptions);
                subscriptions.retain(|s| !s.sender.is_closed());
                subscriptions.push(Subscription {
                    sender,
                    _watcher: watcher,
                });
            }
            // Dropping the sender reads as a closed subscription.
            Err(e) => warn!("Failed to watch {}: {}", self.dir.display(), e),
        }
        receiver
    }
}
