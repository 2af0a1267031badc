//! Tracing/logging setup shared by every process embedding the console core.

/// Initialize process-wide tracing with the `RUST_LOG` filter (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(None);
}

/// Initialize process-wide tracing with an explicit filter directive
/// (e.g. `"gatehouse_client=debug,info"`).
pub fn init_with(filter: &str) {
    tracing::init(Some(filter));
}

/// Tracing configuration (filters, layers).
pub mod tracing;
