use blobtier::cache::{NullSink, TwoTierCache};
use blobtier::config::Config;
use rusqlite::Connection;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::tempdir;
use uuid::Uuid;

#[test]
fn test_open_corrupted_index_fails() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("blobtier.db"), b"not a sqlite database").unwrap();

    let result = TwoTierCache::open(&Config::default().with_cache_dir(dir.path()));
    assert!(result.is_err());
}

#[test]
fn test_index_failure_degrades_without_panicking() {
    let dir = tempdir().unwrap();
    let cache = TwoTierCache::open(&Config::default().with_cache_dir(dir.path())).unwrap();
    cache.put("http://x/before", b"before".to_vec(), || {});

    // Break the index behind the cache's back.
    {
        let conn = Connection::open(dir.path().join("blobtier.db")).unwrap();
        conn.execute_batch("DROP TABLE cache_index").unwrap();
    }

    let uid = cache.index().store("http://x/broken", 3, &NullSink);
    assert!(Uuid::parse_str(&uid).is_ok());

    let done = AtomicBool::new(false);
    cache.put("http://x/after", b"after".to_vec(), || {
        done.store(true, Ordering::SeqCst);
    });
    assert!(done.load(Ordering::SeqCst));

    assert!(cache.get("http://x/never-stored").is_none());
    assert_eq!(cache.index().entry_count(), 0);
    cache.flush();
}

#[test]
fn test_failed_blob_write_reads_as_miss() {
    let dir = tempdir().unwrap();
    let storage = dir.path().join("cache");
    let cache = TwoTierCache::open(&Config::default().with_cache_dir(&storage)).unwrap();

    fs::remove_dir_all(&storage).unwrap();

    let done = AtomicBool::new(false);
    cache.put("http://x/a", b"payload".to_vec(), || {
        done.store(true, Ordering::SeqCst);
    });

    assert!(done.load(Ordering::SeqCst));
    assert!(cache.get("http://x/a").is_none());
    assert_eq!(cache.memory_usage(), 0);
    assert_eq!(cache.stats().misses, 1);
}
