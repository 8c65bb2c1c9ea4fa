use std::collections::HashMap;

use parking_lot::RwLock;

use crate::errors::CacheError;

/// Key/value map without expiration.
///
/// A single read/write lock guards the map: lookups run concurrently with
/// each other, writers are exclusive.
#[derive(Debug)]
pub struct PlainStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> Default for PlainStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> PlainStore<V> {
    pub fn new() -> Self {
        Self::default()
    }
    /// Inserts `value` under `key`, overwriting whatever was there.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(key.into(), value);
    }
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<V: Clone> PlainStore<V> {
    pub fn get(&self, key: &str) -> Result<V, CacheError> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::not_found(key))
    }
}
