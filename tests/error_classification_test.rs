use chrono::Utc;
use lockman::{ErrorKind, LockError, RunError};
use std::io;

#[test]
fn test_unavailable_lock_exit_code() {
    let err = LockError::LockUnavailable {
        uri: "job:42".to_string(),
        tries: 3,
    };
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.kind(), ErrorKind::Acquire);
    assert!(err.to_string().contains("3 attempt(s)"));
}

#[test]
fn test_contended_exit_code() {
    let err = LockError::Contended {
        key: "app.job".to_string(),
        message: "didn't create the lock within 5s".to_string(),
    };
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.kind(), ErrorKind::Acquire);
}

#[test]
fn test_overflow_classification() {
    let now = Utc::now();
    let err = LockError::PlannedTimeOverflow {
        uri: "job".to_string(),
        valid_until: now,
        released_at: now,
    };
    assert_eq!(err.exit_code(), 4);
    assert_eq!(err.kind(), ErrorKind::PlannedTimeOverflow);
}

#[test]
fn test_release_classification() {
    let err = LockError::release("job", "unknown token");
    assert_eq!(err.kind(), ErrorKind::Release);
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.to_string(), "Failed to release lock 'job': unknown token");
}

#[test]
fn test_key_length_classification() {
    let err = LockError::KeyLength {
        key: "k".repeat(70),
        length: 70,
        limit: 64,
    };
    assert_eq!(err.kind(), ErrorKind::KeyLength);
}

#[test]
fn test_permission_error_classification() {
    let io_err = io::Error::from(io::ErrorKind::PermissionDenied);
    let err = LockError::from(io_err);
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.kind(), ErrorKind::General);
}

#[test]
fn test_interrupted_error_classification() {
    let io_err = io::Error::from(io::ErrorKind::Interrupted);
    let err = LockError::from(io_err);
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_release_failure_debug_shows_outcome() {
    let err: RunError<u32, String> = RunError::Release {
        source: LockError::release("job", "gone"),
        outcome: Ok(7),
    };

    let debug = format!("{:?}", err);
    assert!(debug.contains("outcome: Ok(7)"), "got {}", debug);
    assert_eq!(err.into_outcome(), Some(Ok(7)));
}
