//! Tracing, logging and diagnostics identity (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Diagnostics identity for error-report tagging.
pub mod identity;

pub use identity::DiagnosticsIdentity;
