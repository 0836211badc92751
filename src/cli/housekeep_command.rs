use crate::cli::Command;
use lockman::housekeep::{clean_locks, CleanLockConfig};
use lockman::lock::default_lock_dir;
use lockman::utils::parse_duration;
use lockman::{LockError, Result};

pub fn execute_housekeep(cmd: Command, verbose: u8) -> Result<()> {
    let Command::Housekeep {
        dir,
        recursive,
        older_than,
        dry_run,
    } = cmd
    else {
        return Err(LockError::Other(
            "Internal error: expected Housekeep command".to_string(),
        ));
    };

    let duration = match &older_than {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let config = CleanLockConfig {
        dir: dir.unwrap_or_else(default_lock_dir),
        recursive,
        older_than: duration,
        dry_run,
    };

    let cleaned = clean_locks(&config)?;

    for path in &cleaned {
        println!(
            "{}{}",
            if dry_run {
                "[DRY RUN] Would delete: "
            } else {
                "Deleted: "
            },
            path.display()
        );
    }

    if verbose > 0 || dry_run {
        eprintln!("Cleaned {} lock file(s)", cleaned.len());
    }

    Ok(())
}
