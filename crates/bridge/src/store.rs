//! Origin-scoped key/value storage for values that are not secret.

use std::{collections::HashMap, fmt};

use parking_lot::RwLock;

/// Prefix of the per-digest approval flags.
pub const TRANSACTION_APPROVE_PREFIX: &str = "wallet.approve";

/// Plain string key/value persistence.
pub trait NonSensitiveStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Key under which `key` is stored within `prefix`.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{prefix}_{key}")
}

/// Convenience accessors on top of [`NonSensitiveStore`].
pub trait NonSensitiveStoreExt: NonSensitiveStore {
    fn get_prefixed(&self, prefix: &str, key: &str) -> Option<String> {
        self.get(&prefixed_key(prefix, key))
    }

    fn set_prefixed(&self, prefix: &str, key: &str, value: &str) {
        self.set(&prefixed_key(prefix, key), value)
    }

    fn remove_prefixed(&self, prefix: &str, key: &str) {
        self.remove(&prefixed_key(prefix, key))
    }
}

impl<S: NonSensitiveStore + ?Sized> NonSensitiveStoreExt for S {}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl NonSensitiveStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}
