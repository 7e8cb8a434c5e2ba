//! Integration tests for exclusion across concurrently running workflows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use netattach_exclusion::{ExclusionError, ResourceRegistry};

#[test]
fn concurrent_holders_of_one_key_never_overlap() {
    let registry = Arc::new(ResourceRegistry::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    let guard = registry.acquire("tenant-net");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!registry.is_held("tenant-net"));
}

#[test]
fn distinct_keys_do_not_block_each_other() {
    let registry = ResourceRegistry::new();
    let _a = registry.acquire("net-a");

    let b = registry.acquire_timeout("net-b", Duration::from_millis(50));

    assert!(b.is_ok());
}

#[test]
fn released_token_is_observed_by_next_waiter() {
    let registry = Arc::new(ResourceRegistry::new());
    let guard = registry.acquire("net-a");

    let waiter = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let guard = registry.acquire("net-a");
            guard.key().to_string()
        })
    };
    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished());
    guard.release();

    let key = waiter.join().expect("waiter panicked");
    assert_eq!(key, "net-a");
    assert!(!registry.is_held("net-a"));
}

#[test]
fn acquire_release_acquire_does_not_block() -> anyhow::Result<()> {
    let registry = ResourceRegistry::new();

    registry.acquire("net-a").release();
    let again = registry.acquire_timeout("net-a", Duration::from_millis(10))?;

    assert_eq!(again.key(), "net-a");
    Ok(())
}

#[test]
fn leaked_token_blocks_later_acquisitions_until_released_by_hand() {
    let registry = ResourceRegistry::new();
    let key = registry.acquire("net-a").leak();

    assert!(registry.try_acquire("net-a").is_none());
    let timed_out = registry.acquire_timeout("net-a", Duration::from_millis(20));
    assert!(matches!(timed_out, Err(ExclusionError::Timeout { .. })));

    registry.release(&key).expect("token is held");
    assert!(registry.try_acquire("net-a").is_some());
}

#[test]
fn guard_dropped_on_panic_still_releases() {
    let registry = Arc::new(ResourceRegistry::new());

    let worker = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let _guard = registry.acquire("net-a");
            panic!("workflow crashed while holding the token");
        })
    };
    assert!(worker.join().is_err());

    assert!(registry.try_acquire("net-a").is_some());
}
