//! Shared logging/tracing setup for the workspace binaries.

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Initialize process-wide observability.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init();
}
