use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Receipt of one successful lock acquisition.
///
/// The token is what a manager checks on release; a handle built by hand
/// with a made-up token is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    uri: String,
    token: String,
    valid_until: Option<DateTime<Utc>>,
}

impl Handle {
    pub fn new(
        uri: impl Into<String>,
        token: impl Into<String>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        Handle {
            uri: uri.into(),
            token: token.into(),
            valid_until,
        }
    }

    /// Build a handle that is valid for `ttl` from now
    pub fn with_ttl(
        uri: impl Into<String>,
        token: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        // Absurdly long TTLs saturate rather than overflow
        let valid_until = ttl.map(|ttl| {
            ChronoDuration::from_std(ttl)
                .ok()
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Handle::new(uri, token, valid_until)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.valid_until
    }

    /// Time left before the planned hold duration runs out.
    ///
    /// `None` when no TTL was given; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.valid_until.map(|until| {
            (until - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.valid_until, Some(until) if now > until)
    }
}
