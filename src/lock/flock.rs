use super::handle::Handle;
use super::manager::{create_handle, fail_if_ttl_exceeded, LockManager, RetryPolicy};
use super::path::{default_lock_dir, ensure_lock_dir, is_linked_at, lock_file_name};
use crate::error::{LockError, Result};
use chrono::Utc;
use fs2::FileExt;
use rand::Rng;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Check if an I/O error indicates lock contention (file locked by another process)
fn is_lock_contention(e: &io::Error) -> bool {
    // Check for WouldBlock (Unix)
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    if e.raw_os_error().is_some()
        && e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
    {
        return true;
    }
    // Check for Windows-specific lock errors
    // ERROR_LOCK_VIOLATION (33) - file region is locked
    // ERROR_SHARING_VIOLATION (32) - file in use by another process
    #[cfg(windows)]
    if let Some(code) = e.raw_os_error() {
        if code == 33 || code == 32 {
            return true;
        }
    }
    false
}

fn new_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug)]
struct HeldLock {
    uri: String,
    file: File,
    path: PathBuf,
}

/// Lock manager over per-uri lock files and OS advisory locks.
///
/// Advisory locks belong to an open descriptor, not to a path, so every lock
/// this manager hands out keeps its file open until released.
///
/// Lock files are deleted on release by default, while the lock is still
/// held. A contender that was waiting on the old descriptor then finds its
/// file unlinked after locking it, drops it and reopens the path, so only a
/// lock on the file currently at the path counts. `keep_lock_files(true)`
/// leaves files in place for reuse; `housekeep` cleans them up later.
#[derive(Debug)]
pub struct FlockManager {
    policy: RetryPolicy,
    directory: PathBuf,
    keep_lock_files: bool,
    held: HashMap<String, HeldLock>,
}

impl FlockManager {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            directory: default_lock_dir(),
            keep_lock_files: false,
            held: HashMap::new(),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn keep_lock_files(mut self, keep: bool) -> Self {
        self.keep_lock_files = keep;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lock file used for `uri`
    pub fn lock_path(&self, uri: &str) -> PathBuf {
        self.directory.join(lock_file_name(uri))
    }

    /// Number of locks currently held through this manager
    pub fn held(&self) -> usize {
        self.held.len()
    }

    fn open_lock_file(lock_path: &Path) -> Result<File> {
        // Append mode: an existing lock file is reused, never truncated
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);

        // On Unix, use O_NOFOLLOW to reject symlinks at OS level
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_NOFOLLOW);
        }

        opts.open(lock_path)
            .map_err(|e| LockError::LockCreationFailed {
                path: lock_path.to_path_buf(),
                source: e,
            })
    }

    fn remove_lock_file(&self, path: &Path) {
        if self.keep_lock_files {
            debug!("Lock released (file persists): {}", path.display());
            return;
        }

        // Best effort, the lock itself is already gone
        match fs::remove_file(path) {
            Ok(_) => debug!("Lock file removed: {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Lock file already removed: {}", path.display())
            }
            Err(e) => warn!(
                "Failed to remove lock file {} (non-fatal): {}",
                path.display(),
                e
            ),
        }
    }
}

impl Default for FlockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for FlockManager {
    fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn replicate(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            directory: self.directory.clone(),
            keep_lock_files: self.keep_lock_files,
            held: HashMap::new(),
        }
    }

    fn lock(&mut self, uri: &str, ttl: Option<Duration>) -> Result<Option<Handle>> {
        ensure_lock_dir(&self.directory)?;
        let lock_path = self.lock_path(uri);
        debug!(
            "Acquiring lock: {} -> {} (tries: {}, delay: {:?})",
            uri,
            lock_path.display(),
            self.policy.tries(),
            self.policy.delay()
        );

        let mut file = Self::open_lock_file(&lock_path)?;

        let acquired = self.policy.attempt(|_| {
            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(e) if is_lock_contention(&e) => return Ok(None),
                Err(e) => {
                    return Err(LockError::LockAcquisitionFailed {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            }

            let linked = is_linked_at(&file, &lock_path).map_err(|e| {
                LockError::LockAcquisitionFailed {
                    path: lock_path.clone(),
                    source: e,
                }
            })?;
            if linked {
                return Ok(Some(()));
            }

            // Released and deleted while we waited; the old inode guards nothing
            debug!("Lock file replaced, reopening: {}", lock_path.display());
            file = Self::open_lock_file(&lock_path)?;
            Ok(None)
        })?;

        if acquired.is_none() {
            debug!("Lock busy: {}", lock_path.display());
            return Ok(None);
        }

        let mut token = new_token();
        while self.held.contains_key(&token) {
            token = new_token();
        }

        debug!("Lock acquired: {}", lock_path.display());
        let handle = create_handle(uri, &token, ttl);
        self.held.insert(
            token,
            HeldLock {
                uri: uri.to_string(),
                file,
                path: lock_path,
            },
        );

        Ok(Some(handle))
    }

    fn release(&mut self, handle: &Handle) -> Result<()> {
        let held = match self.held.remove(handle.token()) {
            Some(held) if held.uri == handle.uri() => held,
            Some(held) => {
                let uri = held.uri.clone();
                self.held.insert(handle.token().to_string(), held);
                return Err(LockError::release(
                    handle.uri(),
                    format!("token belongs to a lock on '{}'", uri),
                ));
            }
            None => {
                return Err(LockError::release(
                    handle.uri(),
                    "unknown token: not acquired by this manager or already released",
                ))
            }
        };

        // Unlink before unlocking so that whoever locks the old inode next
        // sees it is gone
        self.remove_lock_file(&held.path);

        held.file.unlock().map_err(|e| {
            LockError::release(
                handle.uri(),
                format!("failed to unlock {}: {}", held.path.display(), e),
            )
        })?;
        drop(held);

        fail_if_ttl_exceeded(handle, Utc::now())
    }
}

impl Drop for FlockManager {
    fn drop(&mut self) {
        // Closing the descriptors releases the locks; lock files persist
        for held in self.held.values() {
            warn!(
                "Lock on '{}' dropped without release: {}",
                held.uri,
                held.path.display()
            );
        }
    }
}
