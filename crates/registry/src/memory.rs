//! In-process origin: one store shared by many execution contexts.
//!
//! Each [`MemoryStore`] handed out by [`MemoryOrigin::context`] behaves like
//! one window's view of the origin's storage. Writes through one context
//! notify subscribers of every other context, never the writer.

use crate::{ChangeReceiver, SharedStore, StoreChange, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

type ContextId = u64;

struct Subscriber {
    context: ContextId,
    key: String,
    sender: mpsc::UnboundedSender<StoreChange>,
}

struct OriginState {
    values: HashMap<String, String>,
    subscribers: Vec<Subscriber>,
    next_context: ContextId,
    /// Maximum total size of keys and values in bytes.
    quota: Option<usize>,
    available: bool,
}

impl Default for OriginState {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            subscribers: Vec::new(),
            next_context: 0,
            quota: None,
            available: true,
        }
    }
}

impl OriginState {
    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        let others: usize = self
            .values
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        others + key.len() + value.len()
    }

    fn notify(&mut self, writer: ContextId, key: &str) {
        self.subscribers.retain(|sub| {
            if sub.context == writer || sub.key != key {
                return !sub.sender.is_closed();
            }
            sub.sender
                .send(StoreChange {
                    key: key.to_string(),
                })
                .is_ok()
        });
    }
}

/// Storage shared by every context of one in-process origin.
#[derive(Clone, Default)]
pub struct MemoryOrigin {
    inner: Arc<Mutex<OriginState>>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OriginState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new execution context on this origin.
    pub fn context(&self) -> MemoryStore {
        let mut state = self.lock();
        let context = state.next_context;
        state.next_context += 1;
        MemoryStore {
            origin: self.clone(),
            context,
        }
    }

    /// Limit the total stored size. Writes beyond it fail with `QuotaExceeded`.
    pub fn set_quota(&self, quota: Option<usize>) {
        self.lock().quota = quota;
    }

    /// Make every operation fail with `Unavailable` while `false`.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }
}

/// One execution context's handle to a [`MemoryOrigin`].
#[derive(Clone)]
pub struct MemoryStore {
    origin: MemoryOrigin,
    context: ContextId,
}

impl MemoryStore {
    pub fn origin(&self) -> &MemoryOrigin {
        &self.origin
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let state = self.origin.lock();
        if !state.available {
            return Err(StoreError::Unavailable);
        }
        Ok(state.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.origin.lock();
        if !state.available {
            return Err(StoreError::Unavailable);
        }
        if let Some(quota) = state.quota {
            let needed = state.used_bytes_with(key, value);
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        state.values.insert(key.to_string(), value.to_string());
        state.notify(self.context, key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.origin.lock();
        if !state.available {
            return Err(StoreError::Unavailable);
        }
        let keys: Vec<String> = state.values.drain().map(|(k, _)| k).collect();
        for key in keys {
            state.notify(self.context, &key);
        }
        Ok(())
    }

    fn subscribe(&self, key: &str) -> ChangeReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.origin.lock().subscribers.push(Subscriber {
            context: self.context,
            key: key.to_string(),
            sender,
        });
        receiver
    }
}
