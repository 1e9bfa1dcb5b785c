//! Lock contention, lost-update and partial-write behaviour under concurrent access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use stepstore::storage::{codec, lock};
use stepstore::{
    CounterOp, JsonParameterStore, ParameterDocument, ParameterRepository, StoreConfig, StoreError,
};

#[test]
fn threaded_increments_never_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonParameterStore::open(dir.path(), StoreConfig::default()));
    let defaults = Arc::new(ParameterDocument::new());

    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = store.clone();
            let defaults = defaults.clone();
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    store
                        .increment(&defaults, "counter", "hits", CounterOp::Increment)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let doc = store.read(&defaults).unwrap();
    assert_eq!(
        doc.get("counter", "hits"),
        Some(&json!((THREADS * PER_THREAD) as i64))
    );
}

#[test]
fn mixed_increments_and_decrements_balance_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonParameterStore::open(dir.path(), StoreConfig::default()));
    let defaults = Arc::new(ParameterDocument::new().with("counter", "level", 100));

    let handles: Vec<_> = [
        CounterOp::Increment,
        CounterOp::Decrement,
        CounterOp::Increment,
        CounterOp::Decrement,
    ]
    .into_iter()
    .map(|op| {
        let store = store.clone();
        let defaults = defaults.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                store.increment(&defaults, "counter", "level", op).unwrap();
            }
        })
    })
    .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        store.read_key(&defaults, "counter", "level").unwrap(),
        Some(json!(100))
    );
}

#[test]
fn readers_never_observe_partial_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonParameterStore::open(dir.path(), StoreConfig::default()));
    let defaults = ParameterDocument::new();
    store.bootstrap_defaults(&defaults).unwrap();

    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = store.clone();
        let done = done.clone();
        thread::spawn(move || {
            let defaults = ParameterDocument::new();
            for i in 0..150 {
                // large enough that a torn write would be visible
                let blob: Vec<i64> = (0..512).map(|n| n * i).collect();
                store.update(&defaults, "payload", "blob", json!(blob)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    // Bypass the lock entirely: only the rename protects these reads.
    let raw_reader = {
        let path = store.document_path().to_path_buf();
        let done = done.clone();
        thread::spawn(move || {
            let mut observed = 0;
            while !done.load(Ordering::SeqCst) {
                let bytes = std::fs::read(&path).unwrap();
                assert!(
                    codec::decode(&bytes).is_ok(),
                    "observed a partial document ({} bytes)",
                    bytes.len()
                );
                observed += 1;
            }
            observed
        })
    };

    let locked_reader = {
        let store = store.clone();
        let done = done.clone();
        thread::spawn(move || {
            let defaults = ParameterDocument::new();
            while !done.load(Ordering::SeqCst) {
                store.read(&defaults).unwrap();
            }
        })
    };

    writer.join().unwrap();
    assert!(raw_reader.join().unwrap() > 0);
    locked_reader.join().unwrap();
}

#[test]
fn update_times_out_while_lock_is_held_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default().with_lock_timeout(Duration::from_millis(150));
    let store = JsonParameterStore::open(dir.path(), config);

    let held = lock::acquire(
        store.lock_path(),
        Duration::from_secs(1),
        Duration::from_millis(1),
    )
    .unwrap();

    let started = Instant::now();
    let err = store
        .update(&ParameterDocument::new(), "g", "k", json!(1))
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, StoreError::LockTimeout { .. }));
    assert!(err.is_retryable());
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(5));
    assert!(!store.document_path().exists());

    drop(held);
    store
        .update(&ParameterDocument::new(), "g", "k", json!(1))
        .unwrap();
}

#[test]
fn waiting_caller_proceeds_once_lock_is_released() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonParameterStore::open(dir.path(), StoreConfig::default()));

    let held = lock::acquire(
        store.lock_path(),
        Duration::from_secs(1),
        Duration::from_millis(1),
    )
    .unwrap();

    let waiter = {
        let store = store.clone();
        thread::spawn(move || {
            store.increment(&ParameterDocument::new(), "g", "n", CounterOp::Increment)
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!store.document_path().exists());
    drop(held);

    let doc = waiter.join().unwrap().unwrap();
    assert_eq!(doc.get("g", "n"), Some(&json!(1)));
}

#[test]
fn failed_operation_releases_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::default().with_lock_timeout(Duration::from_millis(200));
    let store = JsonParameterStore::open(dir.path(), config);
    let defaults = ParameterDocument::new();

    store.update(&defaults, "g", "k", json!("text")).unwrap();
    assert!(store.increment(&defaults, "g", "k", CounterOp::Increment).is_err());

    // would time out if the failed increment had kept the lock
    store.update(&defaults, "g", "k", json!(0)).unwrap();
}
