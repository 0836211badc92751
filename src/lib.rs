//! Cross-process mutual exclusion over interchangeable lock backends
//!
//! A [`LockManager`] hands out a [`Handle`] for a named resource and takes it
//! back on release. [`FlockManager`] uses advisory locks on per-resource lock
//! files; [`MySqlLockManager`] uses MySQL named locks.

pub mod error;
pub mod housekeep;
pub mod lock;
pub mod sql;
pub mod utils;

pub use error::{ErrorKind, LockError, Result, RunError};
pub use lock::{FixedKey, FlockManager, Handle, LockManager, MySqlLockManager, RetryPolicy};
