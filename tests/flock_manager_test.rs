use lockman::{ErrorKind, FlockManager, LockError, LockManager};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[test]
fn test_lock_and_release() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new().with_directory(temp.path());

    let handle = manager.lock("job:42", None).unwrap().expect("lock should be free");
    assert_eq!(handle.uri(), "job:42");
    assert!(!handle.token().is_empty());
    assert_eq!(handle.valid_until(), None);
    assert!(manager.lock_path("job:42").exists());
    assert_eq!(manager.held(), 1);

    manager.release(&handle).unwrap();
    assert_eq!(manager.held(), 0);
    assert!(
        !manager.lock_path("job:42").exists(),
        "Lock file should be removed on release"
    );
}

#[test]
fn test_keep_lock_files_leaves_file_behind() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new()
        .with_directory(temp.path())
        .keep_lock_files(true);

    let handle = manager.lock("job:42", None).unwrap().unwrap();
    manager.release(&handle).unwrap();

    assert!(manager.lock_path("job:42").exists());

    // The persisted file is reused by the next holder
    let again = manager.lock("job:42", None).unwrap();
    assert!(again.is_some());
}

#[test]
fn test_double_release_fails() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new().with_directory(temp.path());

    let handle = manager.lock("job:42", None).unwrap().unwrap();
    manager.release(&handle).unwrap();

    let err = manager.release(&handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Release);
}

#[test]
fn test_release_of_foreign_handle_fails() {
    let temp = TempDir::new().unwrap();
    let mut owner = FlockManager::new().with_directory(temp.path());
    let mut stranger = FlockManager::new().with_directory(temp.path());

    let handle = owner.lock("job:42", None).unwrap().unwrap();

    let err = stranger.release(&handle).unwrap_err();
    assert!(matches!(err, LockError::Release { .. }));

    // The real owner is unaffected
    owner.release(&handle).unwrap();
}

#[test]
fn test_second_instance_cannot_lock_held_uri() {
    let temp = TempDir::new().unwrap();
    let mut a = FlockManager::new().with_directory(temp.path());
    let mut b = FlockManager::new().with_directory(temp.path());

    let handle = a.lock("job:42", None).unwrap().unwrap();
    assert!(b.lock("job:42", None).unwrap().is_none());

    // Other uris are independent
    let other = b.lock("job:43", None).unwrap();
    assert!(other.is_some());

    a.release(&handle).unwrap();
    assert!(b.lock("job:42", None).unwrap().is_some());
}

#[test]
fn test_one_instance_holds_several_uris() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new().with_directory(temp.path());

    let first = manager.lock("a", None).unwrap().unwrap();
    let second = manager.lock("b", None).unwrap().unwrap();
    assert_ne!(first.token(), second.token());
    assert_eq!(manager.held(), 2);

    manager.release(&second).unwrap();
    manager.release(&first).unwrap();
    assert_eq!(manager.held(), 0);
}

#[test]
fn test_exhausted_retries_take_expected_time() {
    let temp = TempDir::new().unwrap();
    let mut holder = FlockManager::new().with_directory(temp.path());
    let _handle = holder.lock("busy", None).unwrap().unwrap();

    let mut contender = FlockManager::new()
        .with_directory(temp.path())
        .retry(3, Duration::from_millis(50));

    let start = Instant::now();
    let result = contender.lock("busy", None).unwrap();
    let elapsed = start.elapsed();

    assert!(result.is_none());
    // Two delays between three attempts
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500));
}

#[test]
fn test_retry_picks_up_released_lock() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_path_buf();
    let (locked_tx, locked_rx) = mpsc::channel();

    let holder = thread::spawn(move || {
        let mut manager = FlockManager::new().with_directory(&dir);
        let handle = manager.lock("job", None).unwrap().unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(150));
        manager.release(&handle).unwrap();
    });

    locked_rx.recv().unwrap();
    let mut waiter = FlockManager::new()
        .with_directory(temp.path())
        .retry(50, Duration::from_millis(20));

    let handle = waiter.lock("job", None).unwrap();
    assert!(handle.is_some(), "Waiter should acquire after holder releases");

    holder.join().unwrap();
}

#[test]
fn test_waiter_and_newcomer_never_both_hold_after_release() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_path_buf();
    let mut holder = FlockManager::new().with_directory(temp.path());
    let handle = holder.lock("job:42", None).unwrap().unwrap();

    let (taken_tx, taken_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let waiter = thread::spawn(move || {
        let mut manager = FlockManager::new()
            .with_directory(&dir)
            .retry(50, Duration::from_millis(20));
        let handle = manager.lock("job:42", None).unwrap();
        taken_tx.send(handle.is_some()).unwrap();
        done_rx.recv().unwrap();
        if let Some(handle) = handle {
            manager.release(&handle).unwrap();
        }
    });

    // Let the waiter open the current lock file and start retrying
    thread::sleep(Duration::from_millis(100));
    holder.release(&handle).unwrap();
    assert!(taken_rx.recv().unwrap(), "Waiter should take the released lock");

    let mut newcomer = FlockManager::new().with_directory(temp.path());
    assert!(
        newcomer.lock("job:42", None).unwrap().is_none(),
        "Newcomer must not get the lock the waiter holds"
    );

    done_tx.send(()).unwrap();
    waiter.join().unwrap();

    let handle = newcomer.lock("job:42", None).unwrap().expect("lock is free again");
    newcomer.release(&handle).unwrap();
}

#[test]
fn test_retry_does_not_touch_original() {
    let temp = TempDir::new().unwrap();
    let manager = FlockManager::new().with_directory(temp.path());
    let retrying = manager.retry(5, Duration::from_millis(10));

    assert_eq!(manager.policy().tries(), 1);
    assert_eq!(retrying.policy().tries(), 5);
    assert_eq!(retrying.directory(), temp.path());
}

#[test]
fn test_ttl_overflow_reported_after_release() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new().with_directory(temp.path());
    let mut other = FlockManager::new().with_directory(temp.path());

    let handle = manager
        .lock("slow", Some(Duration::from_millis(10)))
        .unwrap()
        .unwrap();
    assert!(handle.valid_until().is_some());
    thread::sleep(Duration::from_millis(50));

    let err = manager.release(&handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlannedTimeOverflow);

    // The overflow is only a report: the lock is gone
    assert_eq!(manager.held(), 0);
    assert!(other.lock("slow", None).unwrap().is_some());
}

#[test]
fn test_ttl_within_budget_releases_cleanly() {
    let temp = TempDir::new().unwrap();
    let mut manager = FlockManager::new().with_directory(temp.path());

    let handle = manager
        .lock("quick", Some(Duration::from_secs(60)))
        .unwrap()
        .unwrap();
    manager.release(&handle).unwrap();
}

#[test]
fn test_lock_directory_created_on_demand() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("locks").join("nested");
    let mut manager = FlockManager::new().with_directory(&dir);

    let handle = manager.lock("job", None).unwrap().unwrap();
    assert!(dir.is_dir());
    manager.release(&handle).unwrap();
}

#[test]
fn test_dropping_manager_frees_its_locks() {
    let temp = TempDir::new().unwrap();
    {
        let mut manager = FlockManager::new().with_directory(temp.path());
        let _handle = manager.lock("job", None).unwrap().unwrap();
    }

    let mut next = FlockManager::new().with_directory(temp.path());
    assert!(next.lock("job", None).unwrap().is_some());
}
