//! Persistent two-tier blob cache.
//!
//! Payloads are stored as flat files named by a generated uid, indexed by an
//! SQLite database keyed by locator, and kept hot in a bounded memory tier.
//!
//! # Architecture
//!
//! * [`entry`]: metadata record for one cached blob.
//! * [`working_set`]: bounded LRU of hot index rows with deferred access-time writes.
//! * [`sink`]: the [`WriteBackSink`] contract the index uses to request file I/O.
//! * [`database`]: the [`PersistentIndex`], quota accounting and LRU sweeps.
//! * [`memory`]: the locator-to-payload memory tier.
//! * [`disk`]: the [`TwoTierCache`] facade that ties them together.
//!
//! # Eviction
//!
//! When a store pushes disk usage over the quota, rows are swept oldest
//! access first (ties broken by uid) until usage is back within the quota.
//! Reads only bump an in-memory copy of the row; the new access time reaches
//! the database when the row leaves the working set, before a sweep, or on flush.
//!
//! # Failures
//!
//! Only opening a cache can fail. Afterwards database and filesystem errors
//! are logged and turn into cache misses or no-ops.

pub mod database;
pub mod disk;
pub mod entry;
pub mod memory;
pub mod sink;
pub mod working_set;

pub use database::{CacheError, CacheResult, IndexConfig, PersistentIndex};
pub use disk::{CacheStats, TwoTierCache};
pub use entry::CacheEntry;
pub use memory::{MemoryValue, Payload};
pub use sink::{NullSink, WriteBackSink};
