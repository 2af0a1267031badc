//! Path → permission resolution.
//!
//! Prefix mode picks the deepest table key that covers the requested path
//! (`k == path` or `path` starts with `k + "/"`). Among keys of equal depth the
//! lexicographically greatest key wins, so the result never depends on the
//! order the server listed its entries in.

use crate::path::{SEPARATOR, normalize_path, segment_count};
use crate::permissions::PermissionRecord;
use crate::table::PermissionTable;

/// Resolve `requested` against `table`.
///
/// - No IO
/// - No panics
/// - Empty requests (after normalization) resolve to nothing; use
///   [`resolve_for`] to fall back to the current location.
pub fn resolve(table: &PermissionTable, requested: &str, exact: bool) -> Option<PermissionRecord> {
    let path = normalize_path(requested);
    if path.is_empty() {
        return None;
    }

    if exact {
        return table.get(path).copied();
    }

    table
        .iter()
        .filter(|(key, _)| covers(key, path))
        .max_by(|(a, _), (b, _)| segment_count(a).cmp(&segment_count(b)).then_with(|| a.cmp(b)))
        .map(|(_, record)| *record)
}

/// Resolve `requested`, substituting `current_location` when the request is
/// absent or empty after normalization.
pub fn resolve_for(
    table: &PermissionTable,
    requested: Option<&str>,
    current_location: &str,
    exact: bool,
) -> Option<PermissionRecord> {
    let path = requested.map(normalize_path).unwrap_or_default();
    if path.is_empty() {
        resolve(table, current_location, exact)
    } else {
        resolve(table, path, exact)
    }
}

/// Whether table key `key` covers normalized request `path`.
pub(crate) fn covers(key: &str, path: &str) -> bool {
    match path.strip_prefix(key) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}
