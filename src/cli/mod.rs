mod args;
mod exec_command;
mod housekeep_command;

use lockman::Result;
pub use args::{Args, Command};

/// Dispatch the parsed command line; the value is the process exit code
pub fn run(args: Args) -> Result<i32> {
    match args.command {
        cmd @ Command::Exec { .. } => exec_command::execute_exec(cmd, args.verbose),
        cmd @ Command::Housekeep { .. } => {
            housekeep_command::execute_housekeep(cmd, args.verbose)?;
            Ok(0)
        }
    }
}
