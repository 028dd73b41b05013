//! SQLite-backed cache index.
//!
//! The index maps locators to blob file names and keeps the running disk
//! usage. When a store pushes usage over the quota, the least recently used
//! rows are swept and their files deleted through the [`WriteBackSink`].
//!
//! Every operation runs under a single mutex: the connection, the working set,
//! the usage counter and the clock are one unit of state.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::working_set::{WorkingSet, DEFAULT_WORKING_SET_CAPACITY};
use crate::cache::{CacheEntry, WriteBackSink};

/// File name of the index database inside the storage directory.
pub const INDEX_FILE_NAME: &str = "blobtier.db";

/// Default disk quota: 10 MiB.
pub const DEFAULT_DISK_QUOTA_BYTES: u64 = 10 * 1024 * 1024;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_index (
        uid TEXT,
        key TEXT PRIMARY KEY,
        last_access REAL,
        size INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_cache_index_last_access
        ON cache_index (last_access, uid);
";

const SELECT_BY_KEY: &str = "SELECT uid, key, last_access, size FROM cache_index WHERE key = ?1";

// Oldest first; the entry being stored is never its own victim.
const SELECT_SWEEP_ORDER: &str = "SELECT uid, key, last_access, size FROM cache_index
     WHERE key <> ?1
     ORDER BY last_access ASC, uid ASC";

/// Smallest step between two stamps handed out by the same index.
const CLOCK_STEP: f64 = 1e-6;

/// Errors raised while opening the cache.
///
/// Once a cache is open, failures are logged and degrade to misses or no-ops;
/// these errors only reach callers that construct a cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The index database could not be opened or initialized.
    #[error("cache index error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A filesystem operation on the storage directory failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No platform cache directory could be determined.
    #[error("could not determine a cache directory for this platform")]
    NoCacheDir,
}

/// Result alias for cache construction.
pub type CacheResult<T> = Result<T, CacheError>;

/// Tunables for [`PersistentIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Sum of blob sizes above which a quota sweep runs.
    pub disk_quota_bytes: u64,
    /// Number of entries kept in the in-memory working set.
    pub working_set_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            disk_quota_bytes: DEFAULT_DISK_QUOTA_BYTES,
            working_set_capacity: DEFAULT_WORKING_SET_CAPACITY,
        }
    }
}

/// Strictly increasing wall-clock seconds.
struct Clock {
    last: f64,
}

impl Clock {
    fn stamp(&mut self) -> f64 {
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let stamp = if now > self.last {
            now
        } else {
            self.last + CLOCK_STEP
        };
        self.last = stamp;
        stamp
    }
}

struct IndexState {
    conn: Connection,
    working_set: WorkingSet,
    usage: u64,
    clock: Clock,
}

/// Durable index of cached blobs with quota-driven LRU eviction.
pub struct PersistentIndex {
    state: Mutex<IndexState>,
    quota: u64,
    path: PathBuf,
}

impl PersistentIndex {
    /// Open (or create) the index stored in `storage_dir`.
    ///
    /// The running disk usage is recomputed from the rows on every open.
    pub fn open(storage_dir: &Path, config: &IndexConfig) -> CacheResult<Self> {
        let path = storage_dir.join(INDEX_FILE_NAME);
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;

        let (usage, last_access): (i64, f64) = conn.query_row(
            "SELECT COALESCE(SUM(size), 0), COALESCE(MAX(last_access), 0.0) FROM cache_index",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let usage = u64::try_from(usage).unwrap_or(0);

        log::debug!(
            "Opened cache index {} ({} bytes in use, quota {})",
            path.display(),
            usage,
            config.disk_quota_bytes
        );

        Ok(Self {
            state: Mutex::new(IndexState {
                conn,
                working_set: WorkingSet::new(config.working_set_capacity),
                usage,
                clock: Clock { last: last_access },
            }),
            quota: config.disk_quota_bytes,
            path,
        })
    }

    /// Path of the index database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured disk quota in bytes.
    #[must_use]
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Running total of blob sizes recorded in the index.
    #[must_use]
    pub fn current_usage(&self) -> u64 {
        self.lock().usage
    }

    /// Resolve `key` to its blob file name and record the access.
    ///
    /// Only the in-memory copy is stamped; the durable row catches up when the
    /// entry leaves the working set or on [`flush`](Self::flush).
    pub fn lookup(&self, key: &str) -> Option<String> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(entry) = state.working_set.get_mut(key) {
            entry.touch(state.clock.stamp());
            return Some(entry.uid.clone());
        }

        let mut entry = match state.read_entry(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to read cache index entry for {key}: {e}");
                return None;
            }
        };
        entry.touch(state.clock.stamp());
        let uid = entry.uid.clone();
        state.admit(entry);
        Some(uid)
    }

    /// Record a blob of `size` bytes under `key` and return its new file name.
    ///
    /// A previous blob for the same key is handed to `sink` for deletion. If the
    /// store pushes usage past the quota, older entries are swept first. The
    /// caller is responsible for writing the payload under the returned name.
    pub fn store(&self, key: &str, size: u64, sink: &dyn WriteBackSink) -> String {
        self.store_with(key, size, sink, |_| {})
    }

    /// Like [`store`](Self::store), but runs `commit` with the new file name
    /// before the index lock is released.
    ///
    /// No other store, sweep or [`if_current`](Self::if_current) can interleave
    /// with `commit`, so writing the blob there cannot race a replacement of the
    /// same key. `commit` must not call back into the index.
    pub fn store_with<F>(&self, key: &str, size: u64, sink: &dyn WriteBackSink, commit: F) -> String
    where
        F: FnOnce(&str),
    {
        let uid = Uuid::new_v4().to_string();
        let mut guard = self.lock();
        let state = &mut *guard;

        let entry = CacheEntry::new(key, uid.clone(), state.clock.stamp(), size);

        match state.read_entry(key) {
            Ok(Some(existing)) => match state.update_row(&entry) {
                Ok(()) => {
                    state.usage = state.usage.saturating_sub(existing.size) + size;
                    if existing.uid != entry.uid {
                        sink.delete_file(&existing.uid, key);
                    }
                }
                Err(e) => log::warn!("Failed to update cache index entry for {key}: {e}"),
            },
            Ok(None) => match state.insert_row(&entry) {
                Ok(()) => state.usage += size,
                Err(e) => log::warn!("Failed to insert cache index entry for {key}: {e}"),
            },
            Err(e) => log::warn!("Failed to read cache index entry for {key}: {e}"),
        }

        if state.usage > self.quota {
            state.sweep(self.quota, key, sink);
        }

        state.admit(entry);
        commit(&uid);
        uid
    }

    /// Run `f` only if `key` still maps to the blob `uid`, holding the index
    /// lock throughout. Does not record an access.
    ///
    /// Returns `None` when the entry was replaced or swept in the meantime.
    pub fn if_current<R>(&self, key: &str, uid: &str, f: impl FnOnce() -> R) -> Option<R> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let current = match state.working_set.get_mut(key) {
            Some(entry) => entry.uid == uid,
            None => match state.read_entry(key) {
                Ok(entry) => entry.is_some_and(|entry| entry.uid == uid),
                Err(e) => {
                    log::warn!("Failed to read cache index entry for {key}: {e}");
                    false
                }
            },
        };
        current.then(f)
    }

    /// Write every pending access time from the working set to the database.
    pub fn flush(&self) {
        self.lock().flush_dirty();
    }

    /// Number of rows in the index.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        let state = self.lock();
        match state
            .conn
            .query_row("SELECT COUNT(*) FROM cache_index", [], |row| row.get::<_, i64>(0))
        {
            Ok(count) => u64::try_from(count).unwrap_or(0),
            Err(e) => {
                log::warn!("Failed to count cache index entries: {e}");
                0
            }
        }
    }

    /// The durable row for `key`, without recording an access.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().read_entry(key).unwrap_or_else(|e| {
            log::warn!("Failed to read cache index entry for {key}: {e}");
            None
        })
    }

    /// Whether some live row points at the blob `uid`.
    #[must_use]
    pub fn contains_uid(&self, uid: &str) -> bool {
        let state = self.lock();
        state
            .conn
            .query_row(
                "SELECT 1 FROM cache_index WHERE uid = ?1",
                params![uid],
                |_| Ok(()),
            )
            .optional()
            .unwrap_or_else(|e| {
                log::warn!("Failed to query cache index for uid {uid}: {e}");
                None
            })
            .is_some()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PersistentIndex {
    fn drop(&mut self) {
        self.lock().flush_dirty();
    }
}

impl std::fmt::Debug for PersistentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentIndex")
            .field("path", &self.path)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl IndexState {
    fn read_entry(&self, key: &str) -> rusqlite::Result<Option<CacheEntry>> {
        let mut stmt = self.conn.prepare_cached(SELECT_BY_KEY)?;
        stmt.query_row(params![key], CacheEntry::from_row).optional()
    }

    fn insert_row(&self, entry: &CacheEntry) -> rusqlite::Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO cache_index (uid, key, last_access, size) VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![
            entry.uid,
            entry.key,
            entry.last_access,
            sql_size(entry.size)
        ])?;
        Ok(())
    }

    fn update_row(&self, entry: &CacheEntry) -> rusqlite::Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE cache_index SET uid = ?1, last_access = ?2, size = ?3 WHERE key = ?4",
        )?;
        stmt.execute(params![
            entry.uid,
            entry.last_access,
            sql_size(entry.size),
            entry.key
        ])?;
        Ok(())
    }

    /// Persist the access time of an entry that was only touched in memory.
    fn persist_access(&self, entry: &CacheEntry) {
        let result = self
            .conn
            .prepare_cached(
                "UPDATE cache_index SET last_access = ?1, size = ?2 WHERE key = ?3 AND uid = ?4",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    entry.last_access,
                    sql_size(entry.size),
                    entry.key,
                    entry.uid
                ])
            });
        if let Err(e) = result {
            log::warn!("Failed to persist access time for {}: {e}", entry.key);
        }
    }

    /// Put an entry in the working set, flushing whatever dirty entry it displaces.
    fn admit(&mut self, entry: CacheEntry) {
        if let Some(evicted) = self.working_set.upsert(entry) {
            log::trace!("Working set evicted dirty entry {}", evicted.key);
            self.persist_access(&evicted);
        }
    }

    fn flush_dirty(&mut self) {
        let dirty = self.working_set.take_dirty();
        if dirty.is_empty() {
            return;
        }
        log::trace!("Flushing {} dirty working set entries", dirty.len());
        for entry in &dirty {
            self.persist_access(entry);
        }
    }

    /// Delete least recently used rows until usage is back within `quota`.
    ///
    /// Rows, files and the working set are updated one entry at a time with no
    /// enclosing transaction; a failure part way leaves the earlier deletions in place.
    fn sweep(&mut self, quota: u64, keep: &str, sink: &dyn WriteBackSink) {
        // Pending reads must count towards recency before picking victims.
        self.flush_dirty();

        let overflow = self.usage.saturating_sub(quota);
        let victims = match self.select_victims(overflow, keep) {
            Ok(victims) => victims,
            Err(e) => {
                log::error!("Failed to select entries for quota sweep: {e}");
                return;
            }
        };

        let mut freed = 0u64;
        for victim in &victims {
            self.working_set.remove(&victim.key);
            sink.delete_file(&victim.uid, &victim.key);
            match self
                .conn
                .execute("DELETE FROM cache_index WHERE key = ?1", params![victim.key])
            {
                Ok(_) => {
                    self.usage = self.usage.saturating_sub(victim.size);
                    freed += victim.size;
                }
                Err(e) => log::error!("Failed to delete swept entry {}: {e}", victim.key),
            }
        }

        log::debug!(
            "Quota sweep removed {} entries ({} bytes), usage now {} of {}",
            victims.len(),
            freed,
            self.usage,
            quota
        );
    }

    /// Shortest oldest-first run of rows whose sizes add up to `overflow`.
    ///
    /// The whole overflow is freed rather than a fraction of it, so a sweep
    /// always ends within quota when enough older rows exist (DESIGN.md, decision 2).
    fn select_victims(&self, overflow: u64, keep: &str) -> rusqlite::Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare_cached(SELECT_SWEEP_ORDER)?;
        let mut rows = stmt.query(params![keep])?;
        let mut victims = Vec::new();
        let mut total = 0u64;
        while total < overflow {
            let Some(row) = rows.next()? else {
                break;
            };
            let entry = CacheEntry::from_row(row)?;
            total += entry.size;
            victims.push(entry);
        }
        Ok(victims)
    }
}

fn sql_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
