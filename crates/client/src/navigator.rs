//! Navigation seam: where the user currently is, and how to send them to
//! sign-in.

use std::sync::{Mutex, PoisonError};

use gatehouse_auth::normalize_path;

pub trait Navigator: Send + Sync {
    /// Current location, used when a permission lookup names no path.
    fn current_location(&self) -> String;

    /// Leave the authenticated area.
    fn to_sign_in(&self);
}

/// Navigator that only tracks a location string.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<String>,
    sign_in_path: String,
}

impl MemoryNavigator {
    pub fn new(sign_in_path: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(String::new()),
            sign_in_path: normalize_path(&sign_in_path.into()).to_string(),
        }
    }

    pub fn navigate_to(&self, path: &str) {
        *self.lock() = normalize_path(path).to_string();
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.location.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> String {
        self.lock().clone()
    }

    fn to_sign_in(&self) {
        tracing::debug!(path = %self.sign_in_path, "navigating to sign-in");
        *self.lock() = self.sign_in_path.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_location_and_sign_in() {
        let nav = MemoryNavigator::new("/login/");
        nav.navigate_to("/courses/7/");
        assert_eq!(nav.current_location(), "courses/7");

        nav.to_sign_in();
        assert_eq!(nav.current_location(), "login");
    }
}
