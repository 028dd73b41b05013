use blobtier::cache::TwoTierCache;
use blobtier::config::Config;
use std::path::Path;
use tempfile::tempdir;

fn open_with_quota(dir: &Path, disk_quota: u64) -> TwoTierCache {
    let config = Config::default()
        .with_cache_dir(dir)
        .with_disk_quota(disk_quota);
    TwoTierCache::open(&config).unwrap()
}

fn blob_exists(cache: &TwoTierCache, uid: &str) -> bool {
    cache.storage_dir().join(uid).exists()
}

#[test]
fn test_five_entries_over_quota() {
    let dir = tempdir().unwrap();
    let cache = open_with_quota(dir.path(), 1000);

    let locators: Vec<String> = (0..5).map(|i| format!("http://x/{i}")).collect();
    let mut uids = Vec::new();
    for locator in &locators {
        cache.put(locator, vec![0u8; 300], || {});
        uids.push(cache.index().entry(locator).unwrap().uid);
    }

    assert!(cache.disk_usage() <= 1000);
    for i in 0..2 {
        assert!(cache.index().entry(&locators[i]).is_none());
        assert!(!blob_exists(&cache, &uids[i]));
        assert!(cache.get(&locators[i]).is_none());
    }
    for i in 2..5 {
        assert!(cache.index().entry(&locators[i]).is_some());
        assert!(blob_exists(&cache, &uids[i]));
    }
}

#[test]
fn test_lru_order_ignores_insertion_order() {
    let dir = tempdir().unwrap();
    let cache = open_with_quota(dir.path(), 300);

    // Insert C, A, B, then read them back as A, B, C.
    for locator in ["http://x/c", "http://x/a", "http://x/b"] {
        cache.put(locator, vec![0u8; 100], || {});
    }
    for locator in ["http://x/a", "http://x/b", "http://x/c"] {
        // Going through the index so every read is recorded.
        cache.index().lookup(locator);
    }

    // Needs room for 200 more bytes: A and B go, C stays.
    cache.put("http://x/d", vec![0u8; 200], || {});

    assert!(cache.index().entry("http://x/a").is_none());
    assert!(cache.index().entry("http://x/b").is_none());
    assert!(cache.index().entry("http://x/c").is_some());
    assert!(cache.index().entry("http://x/d").is_some());
    assert_eq!(cache.disk_usage(), 300);
}

#[test]
fn test_reads_through_facade_protect_entries() {
    let dir = tempdir().unwrap();
    // No memory tier, so every get goes through the index.
    let config = Config::default()
        .with_cache_dir(dir.path())
        .with_disk_quota(200)
        .with_memory_quota(0);
    let cache = TwoTierCache::open(&config).unwrap();

    cache.put("http://x/old", vec![1u8; 100], || {});
    cache.put("http://x/new", vec![2u8; 100], || {});
    assert!(cache.get("http://x/old").is_some());

    cache.put("http://x/third", vec![3u8; 100], || {});

    assert!(cache.get("http://x/old").is_some());
    assert!(cache.get("http://x/new").is_none());
}

#[test]
fn test_eviction_drops_memory_copy() {
    let dir = tempdir().unwrap();
    let cache = open_with_quota(dir.path(), 100);

    cache.put("http://x/a", vec![1u8; 80], || {});
    assert_eq!(cache.memory_usage(), 80);
    cache.put("http://x/b", vec![2u8; 80], || {});

    assert!(cache.get("http://x/a").is_none());
    assert_eq!(cache.memory_usage(), 80);
    assert_eq!(cache.get("http://x/b").as_deref(), Some(&vec![2u8; 80][..]));
}

#[test]
fn test_usage_matches_index_rows() {
    let dir = tempdir().unwrap();
    let cache = open_with_quota(dir.path(), 5_000);

    for i in 0..40u64 {
        let locator = format!("http://x/{}", i % 13);
        cache.put(&locator, vec![0u8; (i * 37 % 400) as usize], || {});
    }
    let usage = cache.disk_usage();
    assert!(usage <= 5_000);
    drop(cache);

    // Reopening recomputes usage from the rows.
    let cache = open_with_quota(dir.path(), 5_000);
    assert_eq!(cache.disk_usage(), usage);
}
