use serde::Serialize;
use thiserror::Error;

use crate::path::{normalize_path, segment_count};
use crate::permissions::{Action, PermissionRecord};
use crate::resolve::covers;
use crate::table::PermissionTable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no permission entry covers '{0}'")]
    NoEntry(String),

    #[error("forbidden: '{action}' not granted on '{path}'")]
    Forbidden { path: String, action: Action },
}

/// Authorize `action` on `path` using longest-prefix resolution.
///
/// - No IO
/// - No panics
/// - An absent entry is a denial, never an implicit grant
pub fn authorize(table: &PermissionTable, path: &str, action: Action) -> Result<(), AuthzError> {
    let normalized = normalize_path(path);
    let record = crate::resolve::resolve(table, normalized, false)
        .ok_or_else(|| AuthzError::NoEntry(normalized.to_string()))?;

    if record.allows(action) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            path: normalized.to_string(),
            action,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Answers "which table entry decided this, and what else was considered?"
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// Normalized path that was checked.
    pub path: String,

    /// The action being checked.
    pub action: Action,

    /// Whether the action was granted.
    pub granted: bool,

    /// Table key that decided the outcome, if any covered the path.
    pub matched_key: Option<String>,

    /// The record attached to `matched_key`.
    pub record: Option<PermissionRecord>,

    /// Every covering key, deepest first.
    pub candidates: Vec<String>,

    /// Human-readable reason for the decision.
    pub reason: String,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    table: &PermissionTable,
    path: &str,
    action: Action,
) -> AuthorizationExplanation {
    let normalized = normalize_path(path).to_string();

    let mut candidates: Vec<(&str, &PermissionRecord)> = table
        .iter()
        .filter(|(key, _)| !normalized.is_empty() && covers(key, &normalized))
        .collect();
    candidates.sort_by(|(a, _), (b, _)| {
        segment_count(b).cmp(&segment_count(a)).then_with(|| b.cmp(a))
    });

    let Some((matched, record)) = candidates.first().copied() else {
        return AuthorizationExplanation {
            reason: format!("No permission entry covers '{normalized}'"),
            path: normalized,
            action,
            granted: false,
            matched_key: None,
            record: None,
            candidates: Vec::new(),
        };
    };

    let granted = record.allows(action);
    let reason = if granted {
        format!("Entry '{matched}' grants '{action}'")
    } else {
        format!("Entry '{matched}' does not grant '{action}'")
    };

    AuthorizationExplanation {
        path: normalized,
        action,
        granted,
        matched_key: Some(matched.to_string()),
        record: Some(*record),
        candidates: candidates.iter().map(|(k, _)| k.to_string()).collect(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PermissionTable {
        PermissionTable::from_entries([
            ("courses", PermissionRecord::full()),
            ("courses/categories", PermissionRecord::read_only()),
        ])
        .unwrap()
    }

    #[test]
    fn deeper_entry_can_narrow_a_grant() {
        let table = table();
        assert!(authorize(&table, "/courses/12", Action::Delete).is_ok());
        assert_eq!(
            authorize(&table, "/courses/categories/3", Action::Delete),
            Err(AuthzError::Forbidden {
                path: "courses/categories/3".to_string(),
                action: Action::Delete,
            })
        );
        assert!(authorize(&table, "courses/categories", Action::View).is_ok());
    }

    #[test]
    fn missing_entry_is_denied() {
        assert_eq!(
            authorize(&table(), "users", Action::View),
            Err(AuthzError::NoEntry("users".to_string()))
        );
    }

    #[test]
    fn explanation_lists_candidates_deepest_first() {
        let explanation = explain_authorization(&table(), "courses/categories/3", Action::Update);

        assert!(!explanation.granted);
        assert_eq!(explanation.matched_key.as_deref(), Some("courses/categories"));
        assert_eq!(explanation.candidates, vec!["courses/categories", "courses"]);
        assert_eq!(explanation.record, Some(PermissionRecord::read_only()));
    }

    #[test]
    fn explanation_without_candidates() {
        let explanation = explain_authorization(&table(), "/", Action::View);
        assert!(!explanation.granted);
        assert!(explanation.matched_key.is_none());
        assert!(explanation.candidates.is_empty());
    }
}
