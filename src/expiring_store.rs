use std::sync::Arc;

use dashmap::DashMap;

use crate::{entry::ExpiringEntry, errors::CacheError};

/// Key to entry map behind the expiring side of the cache.
///
/// Lookups keep the shard read guard while renewing the entry, so a sweep
/// deleting the same key (shard write guard) cannot interleave with a
/// read-triggered keep-alive.
pub(crate) struct ExpiringStore<E: ExpiringEntry + ?Sized> {
    entries: DashMap<String, Arc<E>>,
}

impl<E: ExpiringEntry + ?Sized> ExpiringStore<E> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
    pub fn insert(&self, key: String, entry: Arc<E>) {
        self.entries.insert(key, entry);
    }
    pub fn get(&self, key: &str) -> Result<Arc<E>, CacheError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| CacheError::not_found(key))?;
        entry.keep_alive();
        Ok(entry.value().clone())
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn clear(&self) {
        self.entries.clear();
    }
    /// Copies the current mapping so a sweep can walk it without holding
    /// any shard lock.
    pub fn snapshot(&self) -> Vec<(String, Arc<E>)> {
        self.entries
            .iter()
            .map(|slot| (slot.key().clone(), slot.value().clone()))
            .collect()
    }
    /// Removes `key` only while it still maps to `entry`. An entry that was
    /// re-inserted under the same key since the snapshot is left alone, and
    /// an absent key is a no-op.
    pub fn remove_entry(&self, key: &str, entry: &Arc<E>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }
}
