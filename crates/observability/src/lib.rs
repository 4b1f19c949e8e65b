//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// `default_level` is used when `RUST_LOG` is not set. This is safe to call
/// multiple times; subsequent calls become no-ops.
pub fn init(default_level: &str) {
    tracing::init(default_level);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
