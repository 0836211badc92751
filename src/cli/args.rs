use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lockman",
    version,
    about = "Cross-process mutual exclusion through advisory lock files",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command while holding the lock for URI
    Exec {
        /// Name of the resource to lock
        #[arg(value_name = "URI")]
        uri: String,

        /// Directory holding the lock files (default: system temp dir)
        #[arg(short = 'd', long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Number of attempts before giving up
        #[arg(short = 'n', long, value_name = "N", default_value_t = 1)]
        tries: u32,

        /// Delay between attempts (e.g., "100ms", "2s")
        #[arg(long, value_name = "DURATION", default_value = "100ms")]
        delay: String,

        /// Planned maximum hold time, checked on release (e.g., "30s")
        #[arg(short = 't', long, value_name = "DURATION")]
        ttl: Option<String>,

        /// Leave the lock file in place after release
        #[arg(long)]
        keep_lock_file: bool,

        /// Command to run, followed by its arguments
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },

    /// Remove orphaned lock files
    Housekeep {
        /// Directory to clean (default: system temp dir)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Scan subdirectories
        #[arg(short = 'r', long)]
        recursive: bool,

        /// Only remove lock files older than this (e.g., "2h")
        #[arg(long, value_name = "DURATION")]
        older_than: Option<String>,

        /// Show what would be deleted without deleting
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}
