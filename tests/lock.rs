// ABOUTME: Integration tests for the rollout lock file.
// ABOUTME: Tests contention between concurrent acquirers, holder info and forced takeover.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rollout::deploy::{DeployErrorKind, Holder, LockManager, LockRecord};
use rollout::types::CommitId;

fn record(holder: Holder) -> LockRecord {
    LockRecord::new(
        holder,
        "start",
        support::sheep(),
        CommitId::new("5eed5eed5eed5eed5eed5eed5eed5eed5eed5eed"),
    )
}

/// Test: Exactly one of many simultaneous acquirers wins.
#[test]
fn concurrent_acquire_has_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".git").join("rollout").join("lock");
    let winners = Arc::new(AtomicUsize::new(0));
    let losers = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let path = path.clone();
            let winners = Arc::clone(&winners);
            let losers = Arc::clone(&losers);
            thread::spawn(move || {
                let holder = Holder {
                    user: format!("user{i}"),
                    host: "pasture".to_string(),
                    pid: i,
                };
                match LockManager::new(path).acquire(record(holder), false) {
                    Ok(_) => winners.fetch_add(1, Ordering::SeqCst),
                    Err(e) => {
                        assert_eq!(e.kind(), DeployErrorKind::AlreadyLocked, "got: {e}");
                        losers.fetch_add(1, Ordering::SeqCst)
                    }
                };
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(losers.load(Ordering::SeqCst), 15);

    // No temp files are left behind.
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
}

/// Test: Contention reports who holds the lock.
#[test]
fn held_lock_reports_holder() {
    let dir = tempfile::tempdir().unwrap();
    let locks = LockManager::for_root(dir.path());
    locks.acquire(record(support::alice()), false).unwrap();

    let err = locks.acquire(record(support::bob()), false).unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::AlreadyLocked);
    let info = err.lock_holder_info().expect("should have lock holder info");
    assert_eq!(info.holder.user, "alice");
    assert_eq!(info.action, "start");
    assert!(err.to_string().contains("alice@pasture"), "got: {err}");
}

/// Test: Force replaces the lock and hands back the old record.
#[test]
fn forced_acquire_discards_previous_holder() {
    let dir = tempfile::tempdir().unwrap();
    let locks = LockManager::for_root(dir.path());
    locks.acquire(record(support::alice()), false).unwrap();

    let acquired = locks.acquire(record(support::bob()), true).unwrap();
    assert_eq!(acquired.discarded.unwrap().holder.user, "alice");
    assert_eq!(locks.inspect().unwrap().unwrap().holder.user, "bob");
}

/// Test: Only the holder may release without force.
#[test]
fn release_requires_same_user() {
    let dir = tempfile::tempdir().unwrap();
    let locks = LockManager::for_root(dir.path());
    locks.acquire(record(support::alice()), false).unwrap();

    let err = locks.release(&support::bob(), false).unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::AlreadyLocked);

    // Same user from another process counts as the holder.
    let other_shell = Holder {
        pid: 1,
        ..support::alice()
    };
    let released = locks.release(&other_shell, false).unwrap();
    assert_eq!(released.unwrap().holder.user, "alice");
    assert!(locks.inspect().unwrap().is_none());
}

/// Test: Releasing a missing lock is an error unless forced.
#[test]
fn release_without_lock() {
    let dir = tempfile::tempdir().unwrap();
    let locks = LockManager::for_root(dir.path());

    let err = locks.release(&support::alice(), false).unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::NotLocked);
    assert!(locks.release(&support::alice(), true).unwrap().is_none());
}

/// Test: A garbage lock file is reported, and force clears it.
#[test]
fn corrupt_lock_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let locks = LockManager::for_root(dir.path());
    std::fs::write(locks.path(), "not json").unwrap();

    let err = locks.inspect().unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::LockCorrupt);

    locks.release(&support::alice(), true).unwrap();
    assert!(!locks.path().exists());
}
