use crate::error::{LockError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

const MAX_STEM_LEN: usize = 64;

/// Derive a filesystem-safe lock file name for an arbitrary uri.
///
/// The readable part keeps ASCII alphanumerics, `-`, `_` and `.`; anything
/// else becomes `_`. A short hash of the raw uri keeps uris that sanitize to
/// the same stem apart.
pub fn lock_file_name(uri: &str) -> String {
    let stem: String = uri
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    // Never start with a dot: hidden files and "." / ".." are off limits
    let stem = stem.trim_start_matches('.');
    let stem = if stem.is_empty() { "lock" } else { stem };

    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    format!("{}.{}.lock", stem, &hash[..8])
}

/// Default directory for lock files: the system temp dir
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Make sure `dir` exists and is a directory, creating it if needed
pub fn ensure_lock_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(LockError::NotADirectory(dir.to_path_buf()));
        }
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|e| LockError::LockCreationFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Whether `file` is still the file found at `path`.
///
/// A lock taken on a descriptor whose file was unlinked or replaced guards
/// nothing: the next opener of `path` gets a different inode.
pub fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    let on_disk = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let held = file.metadata()?;
    Ok(same_inode(&held, &on_disk))
}

#[cfg(unix)]
fn same_inode(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

// Open files cannot be deleted or replaced on Windows
#[cfg(not(unix))]
fn same_inode(_a: &fs::Metadata, b: &fs::Metadata) -> bool {
    b.is_file()
}
