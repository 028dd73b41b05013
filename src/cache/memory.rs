//! Memory tier: locator to payload map with a byte budget.

use std::collections::HashMap;
use std::sync::Arc;

/// Shared, immutable payload bytes.
pub type Payload = Arc<[u8]>;

/// Default memory budget: 8 MiB.
pub const DEFAULT_MEMORY_QUOTA_BYTES: u64 = 8 * 1024 * 1024;

/// What the memory tier holds for a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryValue {
    /// The payload itself, served without touching the disk.
    Payload(Payload),
    /// Only the blob name; the bytes have to be read from disk.
    DiskBacked(String),
}

/// Locator-keyed map that keeps payload bytes only while within budget.
#[derive(Debug)]
pub struct MemoryTier {
    values: HashMap<String, MemoryValue>,
    usage: u64,
    quota: u64,
}

impl MemoryTier {
    /// Empty tier holding at most `quota` payload bytes.
    #[must_use]
    pub fn new(quota: u64) -> Self {
        Self {
            values: HashMap::new(),
            usage: 0,
            quota,
        }
    }

    /// What is held for `locator`, if anything.
    #[must_use]
    pub fn get(&self, locator: &str) -> Option<&MemoryValue> {
        self.values.get(locator)
    }

    /// Store `payload` for `locator`, or only `uid` if the bytes do not fit.
    ///
    /// Returns true when the payload itself was kept.
    pub fn admit(&mut self, locator: &str, uid: &str, payload: Payload) -> bool {
        self.remove(locator);
        let size = payload.len() as u64;
        if self.usage + size > self.quota {
            log::trace!("Memory tier over budget, keeping {locator} on disk only");
            self.values
                .insert(locator.to_string(), MemoryValue::DiskBacked(uid.to_string()));
            false
        } else {
            self.usage += size;
            self.values
                .insert(locator.to_string(), MemoryValue::Payload(payload));
            true
        }
    }

    /// Admit bytes read back from disk for blob `uid`.
    ///
    /// A slot already holding something other than `DiskBacked(uid)` was
    /// written by a newer store and is left alone. Returns true if admitted.
    pub fn promote(&mut self, locator: &str, uid: &str, payload: Payload) -> bool {
        let admissible = match self.values.get(locator) {
            None => true,
            Some(MemoryValue::DiskBacked(held)) => held == uid,
            Some(MemoryValue::Payload(_)) => false,
        };
        admissible && self.admit(locator, uid, payload)
    }

    /// Drop whatever is held for `locator` and release its bytes.
    pub fn remove(&mut self, locator: &str) -> Option<MemoryValue> {
        let removed = self.values.remove(locator);
        if let Some(MemoryValue::Payload(bytes)) = &removed {
            self.usage = self.usage.saturating_sub(bytes.len() as u64);
        }
        removed
    }

    /// Bytes held by payload values.
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage
    }

    /// Configured byte budget.
    #[must_use]
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Number of locators held, payload or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
