//! Published authentication state and lifecycle events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_auth::{MenuTree, PermissionTable, Session, User};
use gatehouse_core::{ProfileId, UserId};
use serde::Serialize;

/// Snapshot of who is signed in and what they may do.
///
/// # Invariants
/// - `user.is_some()` implies `session.is_some()`; a session may briefly
///   exist without a user while the profile is being fetched.
/// - `permissions` and `menu` are only ever replaced whole.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub permissions: Arc<PermissionTable>,
    pub menu: Arc<MenuTree>,
    pub active_function: Option<ProfileId>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.session.is_some()
    }

    pub fn is_consistent(&self) -> bool {
        self.user.is_none() || self.session.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.expires_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    UserRequested,
    Expired,
    RenewalFailed,
}

/// Lifecycle notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    LoggedIn {
        user_id: UserId,
        expires_at: DateTime<Utc>,
    },
    Refreshed {
        expires_at: DateTime<Utc>,
    },
    SessionExtended {
        expires_at: DateTime<Utc>,
    },
    ProfileChanged {
        profile: Option<ProfileId>,
    },
    /// Non-blocking warning banner: the profile has no menu entries.
    EmptyMenuWarning {
        profile: ProfileId,
    },
    LoggedOut {
        reason: LogoutReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_signed_out_and_consistent() {
        let state = AuthState::default();
        assert!(!state.is_authenticated());
        assert!(state.is_consistent());
        assert!(state.permissions.is_empty());
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = AuthEvent::LoggedOut {
            reason: LogoutReason::RenewalFailed,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "logged_out", "reason": "renewal_failed"})
        );
    }
}
