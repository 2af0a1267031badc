use gatehouse_core::ProfileId;
use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Failures surfaced by [`crate::AuthCoordinator`] operations.
///
/// State-mutating operations that fail leave the published state untouched.
#[derive(Debug, Error, Clone)]
pub enum AuthError {
    /// Credentials rejected (or the token handed back was unusable).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Refresh failed or returned no expiry; the session has been terminated.
    #[error("session renewal failed: {0}")]
    Renewal(String),

    /// Who-am-I / change-profile answered with something unusable.
    #[error("profile fetch failed: {0}")]
    ProfileFetch(String),

    /// Not fatal: the requested profile has no menu entries, so the previous
    /// profile stays active.
    #[error("profile {0} has no menu entries; keeping the current profile")]
    EmptyMenu(ProfileId),

    /// The Auth API could not be reached.
    #[error("transport failure: {0}")]
    Transport(ApiError),

    #[error("no active session")]
    NoSession,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Warnings are shown as a banner rather than an error.
    pub fn is_warning(&self) -> bool {
        matches!(self, AuthError::EmptyMenu(_))
    }

    pub(crate) fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::Network(_) => AuthError::Transport(err),
            ApiError::Unauthorized => AuthError::Authentication("credentials rejected".to_string()),
            other => AuthError::Authentication(other.to_string()),
        }
    }

    pub(crate) fn from_profile_fetch(err: ApiError) -> Self {
        match err {
            ApiError::Network(_) => AuthError::Transport(err),
            other => AuthError::ProfileFetch(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_distinguishable() {
        let err = AuthError::from_login(ApiError::Network("connection refused".into()));
        assert!(matches!(err, AuthError::Transport(_)));

        let err = AuthError::from_login(ApiError::Unauthorized);
        assert!(matches!(err, AuthError::Authentication(_)));

        let err = AuthError::from_profile_fetch(ApiError::Api(500, "boom".into()));
        assert!(matches!(err, AuthError::ProfileFetch(_)));
    }

    #[test]
    fn only_empty_menu_is_a_warning() {
        assert!(AuthError::EmptyMenu(ProfileId::from(2)).is_warning());
        assert!(!AuthError::NoSession.is_warning());
    }
}
