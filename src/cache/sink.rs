//! Write-back contract between the index and whatever owns the blob files.

use std::io;

/// Receiver of the file operations the [`PersistentIndex`](crate::cache::PersistentIndex)
/// requests while it mutates the index.
///
/// The index calls these synchronously while holding its own lock, so an
/// implementation must not call back into the index.
pub trait WriteBackSink: Send + Sync {
    /// Persist `payload` as the blob named `uid`.
    fn write_file(&self, uid: &str, payload: &[u8]) -> io::Result<()>;

    /// Forget the blob `uid` that was stored under `key`. Best-effort.
    fn delete_file(&self, uid: &str, key: &str);
}

/// Sink that ignores every request. Useful when only the metadata matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl WriteBackSink for NullSink {
    fn write_file(&self, _uid: &str, _payload: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn delete_file(&self, _uid: &str, _key: &str) {}
}
