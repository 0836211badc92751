mod types;

pub use types::{ErrorKind, LockError, Result, RunError};
