//! Bounded in-memory working set of index rows.
//!
//! Hot entries are served from here instead of the database. Reads only bump
//! the in-memory copy; when a dirty entry falls out of the set the caller gets
//! it back so the new access time can be written to the durable row.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::cache::CacheEntry;

/// Default number of entries kept in the working set.
pub const DEFAULT_WORKING_SET_CAPACITY: usize = 500;

/// Fixed-capacity LRU of [`CacheEntry`] values keyed by locator.
pub struct WorkingSet {
    entries: LruCache<String, CacheEntry>,
}

impl WorkingSet {
    /// Create a working set holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Mutable access to a cached entry, promoting it to most recently used.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    /// Insert or replace an entry.
    ///
    /// Returns the entry that was pushed out to make room, but only when it is
    /// dirty. A replaced entry for the same key is superseded and dropped.
    pub fn upsert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let key = entry.key.clone();
        match self.entries.push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key && evicted.dirty => Some(evicted),
            _ => None,
        }
    }

    /// Remove an entry without reporting it, e.g. after its row was deleted.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.pop(key)
    }

    /// Clear the dirty flag of every entry and return copies of those that had it.
    pub fn take_dirty(&mut self) -> Vec<CacheEntry> {
        let mut dirty = Vec::new();
        for (_, entry) in self.entries.iter_mut() {
            if entry.dirty {
                entry.dirty = false;
                dirty.push(entry.clone());
            }
        }
        dirty
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
