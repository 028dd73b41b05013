//! Two-tier cache facade.
//!
//! [`TwoTierCache`] is what collaborators talk to. It keeps hot payloads in a
//! [`MemoryTier`], records every blob in the [`PersistentIndex`], and performs
//! the file I/O the index asks for by implementing [`WriteBackSink`].
//!
//! # Example
//!
//! ```no_run
//! use blobtier::cache::TwoTierCache;
//! use blobtier::config::Config;
//!
//! let config = Config::default().with_cache_dir("/tmp/blobtier");
//! let cache = TwoTierCache::open(&config).unwrap();
//!
//! cache.put("https://example.com/logo.png", b"\x89PNG...".to_vec(), || {});
//! assert!(cache.get("https://example.com/logo.png").is_some());
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use memmap2::Mmap;
use serde::Serialize;

use crate::cache::memory::{MemoryTier, MemoryValue, Payload};
use crate::cache::{CacheError, CacheResult, PersistentIndex, WriteBackSink};
use crate::config::Config;

/// Counters and sizes describing a cache at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Rows in the index.
    pub entries: u64,
    /// Bytes recorded in the index.
    pub disk_usage: u64,
    /// Configured disk quota.
    pub disk_quota: u64,
    /// Payload bytes held in memory.
    pub memory_usage: u64,
    /// Configured memory budget.
    pub memory_quota: u64,
    /// Reads served from memory.
    pub memory_hits: u64,
    /// Reads served from disk.
    pub disk_hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Completed `put` calls.
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Memory tier in front of a disk-backed, quota-bounded blob store.
pub struct TwoTierCache {
    index: PersistentIndex,
    memory: Mutex<MemoryTier>,
    // Serializes blob writes and deletes.
    file_io: Mutex<()>,
    dir: PathBuf,
    mmap_threshold: u64,
    counters: Counters,
}

impl TwoTierCache {
    /// Open the cache described by `config`, creating its directory if needed.
    ///
    /// Construct one instance at startup and share it (e.g. in an `Arc`).
    pub fn open(config: &Config) -> CacheResult<Self> {
        let dir = config.storage_dir()?;
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        let index = PersistentIndex::open(&dir, &config.index_config())?;

        log::info!("Cache opened at {}", dir.display());

        Ok(Self {
            index,
            memory: Mutex::new(MemoryTier::new(config.memory_quota_bytes)),
            file_io: Mutex::new(()),
            dir,
            mmap_threshold: config.mmap_threshold_bytes,
            counters: Counters::default(),
        })
    }

    /// Cached bytes for `locator`, if any.
    ///
    /// Memory hits never touch the disk. Otherwise the index is consulted and
    /// the blob file read back; a row whose file is missing counts as a miss.
    pub fn get(&self, locator: &str) -> Option<Payload> {
        if let Some(MemoryValue::Payload(bytes)) = self.memory().get(locator) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(bytes));
        }

        let Some(uid) = self.index.lookup(locator) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let path = self.dir.join(&uid);
        match self.read_blob(&path) {
            Ok(Some(bytes)) => {
                self.promote_if_current(locator, &uid, Arc::clone(&bytes));
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                Some(bytes)
            }
            Ok(None) => {
                log::debug!("Index entry for {locator} has no blob at {}", path.display());
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                log::warn!("Failed to read cached blob {}: {e}", path.display());
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `payload` under `locator` and call `on_done` once it is on disk.
    ///
    /// Returns after the index update and the file write have both completed.
    /// The write and the memory update happen under the index lock, so a
    /// concurrent put to the same locator cannot leave a stale blob behind.
    /// A failed write is logged; the locator then reads as a miss.
    pub fn put<F>(&self, locator: &str, payload: impl Into<Payload>, on_done: F)
    where
        F: FnOnce(),
    {
        let payload = payload.into();
        self.index
            .store_with(locator, payload.len() as u64, self, |uid| {
                match self.write_file(uid, &payload) {
                    Ok(()) => {
                        self.memory().admit(locator, uid, Arc::clone(&payload));
                    }
                    Err(e) => {
                        log::warn!("Failed to write cached blob for {locator}: {e}");
                        self.memory().remove(locator);
                    }
                }
            });

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        on_done();
    }

    /// Run [`put`](Self::put) on the rayon thread pool.
    pub fn put_async<F>(self: &Arc<Self>, locator: impl Into<String>, payload: impl Into<Payload>, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let cache = Arc::clone(self);
        let locator = locator.into();
        let payload = payload.into();
        rayon::spawn(move || cache.put(&locator, payload, on_done));
    }

    /// Bytes recorded in the disk index.
    #[must_use]
    pub fn disk_usage(&self) -> u64 {
        self.index.current_usage()
    }

    /// Payload bytes currently held in memory.
    #[must_use]
    pub fn memory_usage(&self) -> u64 {
        self.memory().usage()
    }

    /// Directory holding the index and the blob files.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    /// The underlying index.
    #[must_use]
    pub fn index(&self) -> &PersistentIndex {
        &self.index
    }

    /// Persist pending access times to the index.
    pub fn flush(&self) {
        self.index.flush();
    }

    /// Snapshot of usage, quotas and hit counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (memory_usage, memory_quota) = {
            let memory = self.memory();
            (memory.usage(), memory.quota())
        };
        CacheStats {
            entries: self.index.entry_count(),
            disk_usage: self.index.current_usage(),
            disk_quota: self.index.quota(),
            memory_usage,
            memory_quota,
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }

    /// Keep bytes read from blob `uid` in memory, unless the index no longer
    /// maps `locator` to that blob.
    fn promote_if_current(&self, locator: &str, uid: &str, bytes: Payload) -> bool {
        self.index
            .if_current(locator, uid, || self.memory().promote(locator, uid, bytes))
            .unwrap_or(false)
    }

    /// Read a blob file, memory-mapping it when it is large.
    ///
    /// `Ok(None)` when there is no regular file at `path`.
    fn read_blob(&self, path: &Path) -> io::Result<Option<Payload>> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if metadata.len() >= self.mmap_threshold {
            let file = File::open(path)?;
            // SAFETY: blobs are replaced by rename, never modified in place, so
            // the mapped file does not change while it is copied out.
            let map = unsafe { Mmap::map(&file)? };
            Ok(Some(Payload::from(&map[..])))
        } else {
            Ok(Some(Payload::from(fs::read(path)?)))
        }
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn file_lock(&self) -> MutexGuard<'_, ()> {
        self.file_io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WriteBackSink for TwoTierCache {
    /// Write through a temporary file and rename, so readers never see a partial blob.
    fn write_file(&self, uid: &str, payload: &[u8]) -> io::Result<()> {
        let _guard = self.file_lock();
        let path = self.dir.join(uid);
        let tmp = self.dir.join(format!(".{uid}.tmp"));

        let result = File::create(&tmp)
            .and_then(|mut file| file.write_all(payload))
            .and_then(|()| fs::rename(&tmp, &path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn delete_file(&self, uid: &str, key: &str) {
        self.memory().remove(key);

        let _guard = self.file_lock();
        let path = self.dir.join(uid);
        match fs::remove_file(&path) {
            Ok(()) => log::trace!("Deleted cached blob {} for {key}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to delete cached blob {}: {e}", path.display()),
        }
    }
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("dir", &self.dir)
            .field("index", &self.index)
            .field("mmap_threshold", &self.mmap_threshold)
            .finish_non_exhaustive()
    }
}
