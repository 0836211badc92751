use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`LockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Acquire,
    Release,
    PlannedTimeOverflow,
    KeyLength,
    UnsupportedParameter,
    General,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to acquire lock '{key}': {message}")]
    Acquire { key: String, message: String },

    #[error("Lock '{key}' is held elsewhere: {message}")]
    Contended { key: String, message: String },

    #[error("Failed to acquire lock on '{uri}': gave up after {tries} attempt(s)")]
    LockUnavailable { uri: String, tries: u32 },

    #[error("Failed to create lock file {path}: {source}")]
    LockCreationFailed { path: PathBuf, source: io::Error },

    #[error("Failed to acquire lock on {path}: {source}")]
    LockAcquisitionFailed { path: PathBuf, source: io::Error },

    #[error("Failed to release lock '{uri}': {message}")]
    Release { uri: String, message: String },

    #[error("Planned time for '{uri}' exceeded: valid until {valid_until}, released at {released_at}")]
    PlannedTimeOverflow {
        uri: String,
        valid_until: DateTime<Utc>,
        released_at: DateTime<Utc>,
    },

    #[error("Lock key '{key}' is {length} characters long, the limit is {limit}")]
    KeyLength {
        key: String,
        length: usize,
        limit: usize,
    },

    #[error("Unsupported {name} '{value}': expected {expected}")]
    UnsupportedParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("SQL error: {0}")]
    Sql(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Failed to read from {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Acquire { .. }
            | LockError::Contended { .. }
            | LockError::LockUnavailable { .. }
            | LockError::LockCreationFailed { .. }
            | LockError::LockAcquisitionFailed { .. } => ErrorKind::Acquire,
            LockError::Release { .. } => ErrorKind::Release,
            LockError::PlannedTimeOverflow { .. } => ErrorKind::PlannedTimeOverflow,
            LockError::KeyLength { .. } => ErrorKind::KeyLength,
            LockError::UnsupportedParameter { .. } => ErrorKind::UnsupportedParameter,
            _ => ErrorKind::General,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Contended { .. } | LockError::LockUnavailable { .. } => 2,
            LockError::PlannedTimeOverflow { .. } => 4,
            LockError::Io(e) if e.kind() == io::ErrorKind::Interrupted => 3,
            _ => 1,
        }
    }

    pub fn release(uri: impl Into<String>, message: impl Into<String>) -> Self {
        LockError::Release {
            uri: uri.into(),
            message: message.into(),
        }
    }

    pub fn sql<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LockError::Sql(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

/// Failure of a guarded `run`.
///
/// A release failure wins over the guarded closure's own outcome, which stays
/// attached as `outcome`.
pub enum RunError<T, E> {
    Acquire(LockError),
    Task(E),
    Release {
        source: LockError,
        outcome: std::result::Result<T, E>,
    },
}

impl<T, E> RunError<T, E> {
    /// The lock error behind this failure, if any.
    pub fn lock_error(&self) -> Option<&LockError> {
        match self {
            RunError::Acquire(e) | RunError::Release { source: e, .. } => Some(e),
            RunError::Task(_) => None,
        }
    }

    /// Consumes the error, yielding whatever the guarded closure produced.
    pub fn into_outcome(self) -> Option<std::result::Result<T, E>> {
        match self {
            RunError::Acquire(_) => None,
            RunError::Task(e) => Some(Err(e)),
            RunError::Release { outcome, .. } => Some(outcome),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for RunError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Acquire(e) => f.debug_tuple("Acquire").field(e).finish(),
            RunError::Task(e) => f.debug_tuple("Task").field(e).finish(),
            RunError::Release { source, outcome } => f
                .debug_struct("Release")
                .field("source", source)
                .field("outcome", outcome)
                .finish(),
        }
    }
}

impl<T, E: fmt::Display> fmt::Display for RunError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Acquire(e) => write!(f, "Failed to lock guarded run: {}", e),
            RunError::Task(e) => write!(f, "Guarded run failed: {}", e),
            RunError::Release {
                source,
                outcome: Ok(_),
            } => write!(f, "Failed to clean up after guarded run: {}", source),
            RunError::Release {
                source,
                outcome: Err(e),
            } => write!(
                f,
                "Failed to clean up after guarded run: {} (run itself failed: {})",
                source, e
            ),
        }
    }
}

impl<T, E> std::error::Error for RunError<T, E>
where
    T: fmt::Debug,
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Acquire(e) | RunError::Release { source: e, .. } => Some(e),
            RunError::Task(e) => Some(e),
        }
    }
}
