//! Removal of lock files left behind by holders that never released.
//!
//! A crashed holder's advisory lock dies with its descriptor but the lock file
//! stays. Files whose lock can be taken right away belong to nobody and are
//! safe to delete; files still locked by a live process are skipped.

use crate::error::{LockError, Result};
use crate::lock::is_linked_at;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CleanLockConfig {
    pub dir: PathBuf,
    pub recursive: bool,
    pub older_than: Option<Duration>,
    pub dry_run: bool,
}

/// Clean orphaned lock files
pub fn clean_locks(config: &CleanLockConfig) -> Result<Vec<PathBuf>> {
    if !config.dir.exists() {
        return Err(LockError::PathNotFound(config.dir.clone()));
    }
    if !config.dir.is_dir() {
        return Err(LockError::NotADirectory(config.dir.clone()));
    }

    let mut cleaned = Vec::new();

    visit_directory(&config.dir, config.recursive, &mut |path| {
        if !is_lock_file(path) {
            return Ok(());
        }

        match claim_orphan(path, config.older_than) {
            Ok(Some(_claim)) if config.dry_run => {
                debug!("Would remove lock: {}", path.display());
                cleaned.push(path.to_path_buf());
            }
            // Deleted while still locked, so nobody can take the doomed file
            Ok(Some(_claim)) => match fs::remove_file(path) {
                Ok(_) => {
                    debug!("Removed orphaned lock: {}", path.display());
                    cleaned.push(path.to_path_buf());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Lock file already removed: {}", path.display());
                }
                Err(e) => {
                    warn!("Failed to remove lock file {}: {}", path.display(), e);
                }
            },
            Ok(None) => {
                debug!("Lock file in use or too recent, skipping: {}", path.display());
            }
            Err(LockError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Lock file vanished while checking: {}", path.display());
            }
            Err(e) => {
                warn!("Error checking lock file {}: {}", path.display(), e);
            }
        }
        Ok(())
    })?;

    Ok(cleaned)
}

fn visit_directory<F>(dir: &Path, recursive: bool, visitor: &mut F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    let entries = fs::read_dir(dir).map_err(|e| LockError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(LockError::Io)?;
        let path = entry.path();

        // Get file type WITHOUT following symlinks
        let file_type = entry.file_type().map_err(LockError::Io)?;

        // Skip symlinks entirely (don't traverse, don't process)
        if file_type.is_symlink() {
            debug!("Skipping symlink: {}", path.display());
            continue;
        }

        if file_type.is_dir() && recursive {
            visit_directory(&path, recursive, visitor)?;
        } else if file_type.is_file() {
            visitor(&path)?;
        }
    }
    Ok(())
}

fn is_lock_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("lock")
}

/// Lock an orphaned lock file, handing back the locked descriptor.
///
/// `None` when the file is too recent, locked by a live holder, or was
/// replaced by a new holder's file between opening and locking.
fn claim_orphan(lock_path: &Path, older_than: Option<Duration>) -> Result<Option<File>> {
    // Check age filter first
    if let Some(max_age) = older_than {
        let metadata = fs::metadata(lock_path).map_err(LockError::Io)?;
        let mtime = metadata.modified().map_err(LockError::Io)?;
        if let Ok(elapsed) = SystemTime::now().duration_since(mtime) {
            if elapsed < max_age {
                return Ok(None);
            }
        }
    }

    let file = File::open(lock_path).map_err(LockError::Io)?;

    match file.try_lock_exclusive() {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            return Ok(None)
        }
        Err(e) => return Err(LockError::Io(e)),
    }

    if !is_linked_at(&file, lock_path).map_err(LockError::Io)? {
        debug!("Lock file replaced while checking: {}", lock_path.display());
        return Ok(None);
    }
    Ok(Some(file))
}
