//! Cache entry definitions.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Metadata for one cached blob, as stored in the index.
///
/// The payload itself lives in a flat file named after [`CacheEntry::uid`];
/// the entry only records where it is, how big it is and when it was last used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// External locator (typically a URL). Primary key of the index.
    pub key: String,
    /// Generated file name of the blob under the storage directory.
    pub uid: String,
    /// Seconds since the Unix epoch of the last read or write.
    pub last_access: f64,
    /// Payload length in bytes.
    pub size: u64,
    /// Set when `last_access` changed in memory but not in the database.
    #[serde(skip)]
    pub dirty: bool,
}

impl CacheEntry {
    /// Create a clean entry for a freshly stored blob.
    #[must_use]
    pub fn new(key: impl Into<String>, uid: impl Into<String>, last_access: f64, size: u64) -> Self {
        Self {
            key: key.into(),
            uid: uid.into(),
            last_access,
            size,
            dirty: false,
        }
    }

    /// Record a read at `now` without touching the database.
    pub fn touch(&mut self, now: f64) {
        self.last_access = now;
        self.dirty = true;
    }

    /// Build an entry from a `SELECT uid, key, last_access, size` row.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let size: i64 = row.get(3)?;
        Ok(Self {
            uid: row.get(0)?,
            key: row.get(1)?,
            last_access: row.get(2)?,
            size: u64::try_from(size).unwrap_or(0),
            dirty: false,
        })
    }
}
