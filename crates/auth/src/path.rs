//! Console path normalization.

/// Separator used by console routes and permission keys.
pub const SEPARATOR: char = '/';

/// Strip leading and trailing separators.
///
/// Interior segments are left untouched; `"/dashboard/profile/"` becomes
/// `"dashboard/profile"` and `"///"` becomes `""`.
pub fn normalize_path(path: &str) -> &str {
    path.trim().trim_matches(SEPARATOR)
}

/// Number of non-empty segments in `path`.
pub fn segment_count(path: &str) -> usize {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).count()
}
