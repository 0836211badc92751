use super::handle::Handle;
use super::manager::{create_handle, fail_if_ttl_exceeded, LockManager, RetryPolicy};
use crate::error::{LockError, Result};
use crate::sql::{PreparedStatement, Row, SqlConnection, SqlValue};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest lock name MySQL accepts
pub const MAX_KEY_LEN: usize = 64;

/// `GET_LOCK` timeout meaning "wait as long as it takes"
pub const ENDLESS: i64 = -1;

const GET_LOCK_SQL: &str = "SELECT GET_LOCK(?, ?)";
const RELEASE_LOCK_SQL: &str = "SELECT RELEASE_LOCK(?)";

/// Lock manager over MySQL named locks (`GET_LOCK` / `RELEASE_LOCK`).
///
/// Named locks belong to the session that took them and vanish with it; they
/// have no expiry of their own. Keys are `prefix + uri`, the prefix defaulting
/// to the current database name and a dot.
pub struct MySqlLockManager<C: SqlConnection> {
    policy: RetryPolicy,
    connection: Arc<C>,
    prefix: String,
    get_lock: Option<C::Statement>,
    release_lock: Option<C::Statement>,
}

fn check_dialect<C: SqlConnection>(connection: &C) -> Result<()> {
    if connection.dialect() != "mysql" {
        return Err(LockError::UnsupportedParameter {
            name: "connection dialect",
            value: connection.dialect().to_string(),
            expected: "mysql",
        });
    }
    Ok(())
}

/// GET_LOCK timeout for a TTL, rounded up to whole seconds
fn timeout_seconds(ttl: Option<Duration>) -> i64 {
    match ttl {
        Some(ttl) if !ttl.is_zero() => {
            let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
            i64::try_from(secs).unwrap_or(i64::MAX)
        }
        _ => ENDLESS,
    }
}

/// First column of the first row, as an integer
fn verdict(rows: Vec<Row>) -> Option<i64> {
    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .and_then(|value| value.as_i64())
}

impl<C: SqlConnection> MySqlLockManager<C> {
    /// Build a manager on `connection`, which must speak MySQL.
    pub fn new(connection: Arc<C>) -> Result<Self> {
        check_dialect(connection.as_ref())?;
        let database = connection.database().map_err(LockError::sql)?;

        Ok(Self {
            policy: RetryPolicy::default(),
            connection,
            prefix: format!("{}.", database),
            get_lock: None,
            release_lock: None,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Swap the connection; cached statements belong to the old one and are dropped.
    pub fn set_connection(&mut self, connection: Arc<C>) -> Result<()> {
        check_dialect(connection.as_ref())?;
        self.connection = connection;
        self.get_lock = None;
        self.release_lock = None;
        Ok(())
    }

    /// Namespaced lock name for `uri`, checked against MySQL's length limit
    pub fn key_for(&self, uri: &str) -> Result<String> {
        let key = format!("{}{}", self.prefix, uri);
        let length = key.chars().count();
        if length > MAX_KEY_LEN {
            return Err(LockError::KeyLength {
                key,
                length,
                limit: MAX_KEY_LEN,
            });
        }
        Ok(key)
    }

    fn get_lock_statement(&mut self) -> Result<&mut C::Statement> {
        let statement = match self.get_lock.take() {
            Some(statement) => statement,
            None => self
                .connection
                .prepare(GET_LOCK_SQL)
                .map_err(LockError::sql)?,
        };
        Ok(self.get_lock.insert(statement))
    }

    fn release_lock_statement(&mut self) -> Result<&mut C::Statement> {
        let statement = match self.release_lock.take() {
            Some(statement) => statement,
            None => self
                .connection
                .prepare(RELEASE_LOCK_SQL)
                .map_err(LockError::sql)?,
        };
        Ok(self.release_lock.insert(statement))
    }

    /// Issue a single `GET_LOCK(key, seconds)`.
    ///
    /// A `0` verdict means another session kept the lock for the whole
    /// timeout and comes back as [`LockError::Contended`]; `NULL` means the
    /// server gave up on the request and comes back as [`LockError::Acquire`].
    pub fn lock_or_fail(&mut self, key: &str, seconds: i64) -> Result<()> {
        let rows = self
            .get_lock_statement()?
            .bind(&[SqlValue::from(key), SqlValue::from(seconds)])
            .map_err(LockError::sql)?;

        match verdict(rows) {
            Some(1) => Ok(()),
            Some(0) if seconds == ENDLESS => Err(LockError::Contended {
                key: key.to_string(),
                message: "no endless lock: GET_LOCK returned 0".to_string(),
            }),
            Some(0) => Err(LockError::Contended {
                key: key.to_string(),
                message: format!("didn't create the lock within {}s", seconds),
            }),
            None if seconds == ENDLESS => Err(LockError::Acquire {
                key: key.to_string(),
                message: "no endless lock: GET_LOCK returned NULL (server error or killed session)"
                    .to_string(),
            }),
            None => Err(LockError::Acquire {
                key: key.to_string(),
                message: format!(
                    "GET_LOCK returned NULL with a {}s timeout (server error or killed session)",
                    seconds
                ),
            }),
            Some(other) => Err(LockError::Acquire {
                key: key.to_string(),
                message: format!("unexpected GET_LOCK verdict {}", other),
            }),
        }
    }
}

impl<C: SqlConnection> LockManager for MySqlLockManager<C> {
    fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn replicate(&self, policy: RetryPolicy) -> Self {
        Self {
            policy,
            connection: Arc::clone(&self.connection),
            prefix: self.prefix.clone(),
            get_lock: None,
            release_lock: None,
        }
    }

    fn lock(&mut self, uri: &str, ttl: Option<Duration>) -> Result<Option<Handle>> {
        let key = self.key_for(uri)?;
        let seconds = timeout_seconds(ttl);
        debug!(
            "Acquiring named lock: {} (timeout: {}s, tries: {})",
            key,
            seconds,
            self.policy.tries()
        );

        let policy = self.policy.clone();
        let acquired = policy.attempt(|_| match self.lock_or_fail(&key, seconds) {
            Ok(()) => Ok(Some(())),
            Err(LockError::Contended { message, .. }) => {
                debug!("Named lock busy: {} ({})", key, message);
                Ok(None)
            }
            Err(e) => Err(e),
        })?;

        Ok(acquired.map(|()| {
            debug!("Named lock acquired: {}", key);
            create_handle(uri, &key, ttl)
        }))
    }

    fn release(&mut self, handle: &Handle) -> Result<()> {
        let rows = self
            .release_lock_statement()?
            .bind(&[SqlValue::from(handle.token())])
            .map_err(LockError::sql)?;

        match verdict(rows) {
            Some(1) => {
                debug!("Named lock released: {}", handle.token());
                fail_if_ttl_exceeded(handle, Utc::now())
            }
            Some(_) => Err(LockError::release(
                handle.uri(),
                format!("lock '{}' is held by another session", handle.token()),
            )),
            None => Err(LockError::release(
                handle.uri(),
                format!(
                    "lock '{}' does not exist: already released or its session ended",
                    handle.token()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_seconds() {
        assert_eq!(timeout_seconds(None), ENDLESS);
        assert_eq!(timeout_seconds(Some(Duration::ZERO)), ENDLESS);
        assert_eq!(timeout_seconds(Some(Duration::from_millis(1))), 1);
        assert_eq!(timeout_seconds(Some(Duration::from_millis(1000))), 1);
        assert_eq!(timeout_seconds(Some(Duration::from_millis(1500))), 2);
        assert_eq!(timeout_seconds(Some(Duration::from_secs(30))), 30);
    }

    #[test]
    fn test_verdict_reads_first_cell() {
        assert_eq!(verdict(vec![vec![SqlValue::Int(1)]]), Some(1));
        assert_eq!(verdict(vec![vec![SqlValue::Text("0".into())]]), Some(0));
        assert_eq!(verdict(vec![vec![SqlValue::Null]]), None);
        assert_eq!(verdict(vec![]), None);
        assert_eq!(verdict(vec![vec![]]), None);
    }
}
