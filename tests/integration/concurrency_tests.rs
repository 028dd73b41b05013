use blobtier::cache::TwoTierCache;
use blobtier::config::Config;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn payload_for(i: usize) -> Vec<u8> {
    format!("payload number {i:04}").into_bytes()
}

#[test]
fn test_parallel_puts_and_gets() {
    let dir = tempdir().unwrap();
    let cache = TwoTierCache::open(&Config::default().with_cache_dir(dir.path())).unwrap();

    (0..200usize).into_par_iter().for_each(|i| {
        cache.put(&format!("http://x/{i}"), payload_for(i), || {});
    });

    (0..200usize).into_par_iter().for_each(|i| {
        let got = cache.get(&format!("http://x/{i}"));
        assert_eq!(got.as_deref(), Some(&payload_for(i)[..]));
    });

    assert_eq!(cache.index().entry_count(), 200);
    let expected: u64 = (0..200).map(|i| payload_for(i).len() as u64).sum();
    assert_eq!(cache.disk_usage(), expected);
}

#[test]
fn test_parallel_puts_respect_quota() {
    let dir = tempdir().unwrap();
    let config = Config::default()
        .with_cache_dir(dir.path())
        .with_disk_quota(4_096)
        .with_memory_quota(1_024)
        .with_working_set_capacity(16);
    let cache = TwoTierCache::open(&config).unwrap();

    (0..300usize).into_par_iter().for_each(|i| {
        let locator = format!("http://x/{}", i % 50);
        cache.put(&locator, vec![(i % 251) as u8; 128], || {});
        let _ = cache.get(&format!("http://x/{}", (i * 7) % 50));
    });

    assert!(cache.disk_usage() <= 4_096);
    assert_eq!(cache.disk_usage(), cache.index().entry_count() * 128);
}

#[test]
fn test_put_async_invokes_callback() {
    let dir = tempdir().unwrap();
    let cache =
        Arc::new(TwoTierCache::open(&Config::default().with_cache_dir(dir.path())).unwrap());
    let done = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    for i in 0..10usize {
        let done = Arc::clone(&done);
        let tx = tx.clone();
        cache.put_async(format!("http://x/{i}"), payload_for(i), move || {
            done.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        });
    }

    for _ in 0..10 {
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    assert_eq!(done.load(Ordering::SeqCst), 10);
    for i in 0..10usize {
        assert_eq!(
            cache.get(&format!("http://x/{i}")).as_deref(),
            Some(&payload_for(i)[..])
        );
    }
}

#[test]
fn test_parallel_puts_to_one_locator_stay_consistent() {
    let dir = tempdir().unwrap();
    let cache = TwoTierCache::open(&Config::default().with_cache_dir(dir.path())).unwrap();

    (0..400usize).into_par_iter().for_each(|i| {
        cache.put("http://x/shared", payload_for(i), || {});
        let _ = cache.get("http://x/shared");
    });

    // Exactly one blob file survives, and memory serves what the index points at.
    let uid = cache.index().entry("http://x/shared").unwrap().uid;
    let blobs: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with("blobtier.db"))
        .collect();
    assert_eq!(blobs, vec![uid.clone()]);

    let on_disk = fs::read(dir.path().join(&uid)).unwrap();
    assert_eq!(cache.get("http://x/shared").as_deref(), Some(&on_disk[..]));
    assert_eq!(cache.memory_usage(), on_disk.len() as u64);
}
