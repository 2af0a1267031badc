use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerated difference, in seconds, between the server clock that stamped
/// `issued_at` and the local clock.
pub const CLOCK_SKEW_LEEWAY_SECS: i64 = 60;

/// An authenticated session as seen by the console.
///
/// # Invariants
/// - `expires_at` only moves forward while the session is active
///   (see [`Session::extend_to`]).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
            expires_at,
        }
    }

    /// Remaining lifetime; negative once expired.
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Push the expiry forward. Earlier or equal timestamps are ignored.
    ///
    /// Returns whether the expiry changed.
    pub fn extend_to(&mut self, expires_at: DateTime<Utc>) -> bool {
        if expires_at > self.expires_at {
            self.expires_at = expires_at;
            true
        } else {
            false
        }
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("session has expired")]
    Expired,

    #[error("session not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid session time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("session token is empty")]
    EmptyToken,
}

/// Deterministically validate a session's time window.
pub fn validate_session(session: &Session, now: DateTime<Utc>) -> Result<(), SessionValidationError> {
    if session.token.trim().is_empty() {
        return Err(SessionValidationError::EmptyToken);
    }
    if session.expires_at <= session.issued_at {
        return Err(SessionValidationError::InvalidTimeWindow);
    }
    if now + Duration::seconds(CLOCK_SKEW_LEEWAY_SECS) < session.issued_at {
        return Err(SessionValidationError::NotYetValid);
    }
    if session.is_expired(now) {
        return Err(SessionValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn extend_to_is_monotonic() {
        let mut session = Session::new("t", at(0), at(100));
        assert!(session.extend_to(at(200)));
        assert!(!session.extend_to(at(150)));
        assert_eq!(session.expires_at, at(200));
    }

    #[test]
    fn validate_checks_window_and_expiry() {
        let session = Session::new("t", at(0), at(100));
        assert_eq!(validate_session(&session, at(50)), Ok(()));
        assert_eq!(validate_session(&session, at(100)), Err(SessionValidationError::Expired));
        assert_eq!(
            validate_session(&Session::new("t", at(10), at(10)), at(5)),
            Err(SessionValidationError::InvalidTimeWindow)
        );
        assert_eq!(
            validate_session(&Session::new(" ", at(0), at(100)), at(5)),
            Err(SessionValidationError::EmptyToken)
        );
    }

    #[test]
    fn small_clock_skew_is_tolerated() {
        let session = Session::new("t", at(30), at(300));
        assert_eq!(validate_session(&session, at(0)), Ok(()));
        assert_eq!(
            validate_session(&session, at(-100)),
            Err(SessionValidationError::NotYetValid)
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", Session::new("secret-token", at(0), at(1)));
        assert!(!rendered.contains("secret-token"));
    }
}
