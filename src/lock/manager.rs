use super::handle::Handle;
use crate::error::{LockError, Result, RunError};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::panic::Location;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try for a lock and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    tries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `tries` below one is treated as one
    pub fn new(tries: u32, delay: Duration) -> Self {
        Self {
            tries: tries.max(1),
            delay,
        }
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Call `attempt` up to `tries` times until it yields a value.
    ///
    /// Sleeps `delay` between attempts, never after the last one. `Ok(None)`
    /// means every attempt came back empty. Errors are returned as soon as
    /// they happen and are not retried.
    pub fn attempt<T, F>(&self, mut attempt: F) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Result<Option<T>>,
    {
        for n in 0..self.tries {
            if let Some(value) = attempt(n)? {
                debug!("Attempt {}/{} succeeded", n + 1, self.tries);
                return Ok(Some(value));
            }

            if n + 1 < self.tries {
                debug!(
                    "Attempt {}/{} failed, retrying in {:?}",
                    n + 1,
                    self.tries,
                    self.delay
                );
                thread::sleep(self.delay);
            }
        }

        debug!("Giving up after {} attempt(s)", self.tries);
        Ok(None)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Derives the lock key `run` uses for a guarded closure.
pub trait KeyStrategy {
    fn derive<F>(&self, task: &F) -> String;
}

fn hashed_key(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("run.{}", &hash[..16])
}

/// Keys a closure by its type name.
///
/// Closures defined in the same function share a type name prefix and can map
/// to the same key; use [`CallSiteKey`] or [`FixedKey`] when that matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeNameKey;

impl KeyStrategy for TypeNameKey {
    fn derive<F>(&self, _task: &F) -> String {
        hashed_key(std::any::type_name::<F>())
    }
}

/// Keys a closure by its type name and the source location it was run from.
///
/// The key `run` uses: every call site gets its own lock, and repeated runs
/// from one site contend with each other.
#[derive(Debug, Clone, Copy)]
pub struct CallSiteKey {
    site: &'static Location<'static>,
}

impl CallSiteKey {
    /// Key for the location this is called from
    #[track_caller]
    pub fn here() -> Self {
        Self::at(Location::caller())
    }

    pub fn at(site: &'static Location<'static>) -> Self {
        Self { site }
    }
}

impl KeyStrategy for CallSiteKey {
    fn derive<F>(&self, _task: &F) -> String {
        hashed_key(&format!("{}@{}", std::any::type_name::<F>(), self.site))
    }
}

/// A caller-chosen key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedKey(pub String);

impl FixedKey {
    pub fn new(key: impl Into<String>) -> Self {
        FixedKey(key.into())
    }
}

impl KeyStrategy for FixedKey {
    fn derive<F>(&self, _task: &F) -> String {
        self.0.clone()
    }
}

/// Handle for `uri`, valid for `ttl` from now when a TTL is given
pub fn create_handle(uri: &str, token: &str, ttl: Option<Duration>) -> Handle {
    Handle::with_ttl(uri, token, ttl)
}

/// Report a handle that was held past its planned time.
///
/// Nothing enforces the TTL, so once this fires other contenders may already
/// have assumed the lock was free.
pub fn fail_if_ttl_exceeded(handle: &Handle, now: DateTime<Utc>) -> Result<()> {
    match handle.valid_until() {
        Some(valid_until) if handle.is_overdue(now) => {
            warn!(
                "Lock '{}' held past its planned time ({} > {})",
                handle.uri(),
                now,
                valid_until
            );
            Err(LockError::PlannedTimeOverflow {
                uri: handle.uri().to_string(),
                valid_until,
                released_at: now,
            })
        }
        _ => Ok(()),
    }
}

/// A cross-process mutual exclusion backend.
///
/// Backends supply `lock`, `release` and `replicate`; retry configuration and
/// guarded execution come for free.
pub trait LockManager: Sized {
    fn policy(&self) -> &RetryPolicy;

    /// A new manager with `policy` and this one's backend dependencies.
    ///
    /// Locks held by `self` stay with `self`.
    fn replicate(&self, policy: RetryPolicy) -> Self;

    /// Try to take the lock for `uri`.
    ///
    /// `Ok(None)` means the retry budget ran out while someone else held it.
    fn lock(&mut self, uri: &str, ttl: Option<Duration>) -> Result<Option<Handle>>;

    /// Give back a lock taken through this manager.
    fn release(&mut self, handle: &Handle) -> Result<()>;

    fn retry(&self, times: u32, delay: Duration) -> Self {
        self.replicate(RetryPolicy::new(times, delay))
    }

    /// Run `task` while holding a lock keyed by the closure's type and the
    /// calling location.
    #[track_caller]
    fn run<T, E, F>(
        &mut self,
        ttl: Option<Duration>,
        task: F,
    ) -> std::result::Result<T, RunError<T, E>>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        self.run_with(&CallSiteKey::here(), ttl, task)
    }

    /// Run `task` while holding the lock `keys` derives for it.
    ///
    /// The lock is released exactly once after `task` returns. A failed
    /// release is reported ahead of the task's own result, which is kept in
    /// [`RunError::Release`].
    fn run_with<K, T, E, F>(
        &mut self,
        keys: &K,
        ttl: Option<Duration>,
        task: F,
    ) -> std::result::Result<T, RunError<T, E>>
    where
        K: KeyStrategy,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let uri = keys.derive(&task);
        let handle = match self.lock(&uri, ttl) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                return Err(RunError::Acquire(LockError::LockUnavailable {
                    uri,
                    tries: self.policy().tries(),
                }))
            }
            Err(e) => return Err(RunError::Acquire(e)),
        };

        let outcome = task();
        clean_up_and_finish(self, &handle, outcome)
    }
}

fn clean_up_and_finish<M, T, E>(
    manager: &mut M,
    handle: &Handle,
    outcome: std::result::Result<T, E>,
) -> std::result::Result<T, RunError<T, E>>
where
    M: LockManager,
{
    match manager.release(handle) {
        Ok(()) => outcome.map_err(RunError::Task),
        Err(source) => {
            warn!(
                "Release of '{}' after guarded run failed: {}",
                handle.uri(),
                source
            );
            Err(RunError::Release { source, outcome })
        }
    }
}
