use crate::cli::Command;
use lockman::utils::parse_duration;
use lockman::{FixedKey, FlockManager, LockError, LockManager, Result, RunError};
use std::process::{self, ExitStatus};
use tracing::warn;

pub fn execute_exec(cmd: Command, verbose: u8) -> Result<i32> {
    let Command::Exec {
        uri,
        dir,
        tries,
        delay,
        ttl,
        keep_lock_file,
        command,
    } = cmd
    else {
        return Err(LockError::Other(
            "Internal error: expected Exec command".to_string(),
        ));
    };

    let delay = parse_duration(&delay)?;
    let ttl = match &ttl {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let mut manager = FlockManager::new().keep_lock_files(keep_lock_file);
    if let Some(dir) = dir {
        manager = manager.with_directory(dir);
    }
    let mut manager = manager.retry(tries, delay);
    let lock_path = manager.lock_path(&uri);

    let (program, program_args) = command
        .split_first()
        .ok_or_else(|| LockError::Other("Command required".to_string()))?;

    let outcome = manager.run_with(&FixedKey::new(uri.as_str()), ttl, || {
        if verbose > 0 {
            eprintln!("Lock acquired: {}", lock_path.display());
        }
        process::Command::new(program).args(program_args).status()
    });

    match outcome {
        Ok(status) => {
            if verbose > 0 {
                eprintln!("Lock released: {}", lock_path.display());
            }
            Ok(exit_code(status))
        }
        Err(RunError::Acquire(e)) => Err(e),
        Err(RunError::Task(e)) => Err(LockError::Other(format!(
            "Failed to run '{}': {}",
            program, e
        ))),
        Err(RunError::Release { source, outcome }) => {
            match outcome {
                Ok(status) => warn!("'{}' finished with {}", program, status),
                Err(e) => warn!("'{}' failed to run: {}", program, e),
            }
            Err(source)
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    // Killed by a signal: report it the way shells do
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
