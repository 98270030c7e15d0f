//! Tracing and logging setup shared by the engine's binaries and tests.

/// Initialize process-wide tracing with the default configuration.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&ObservabilityConfig::default());
}

/// Initialize process-wide tracing with an explicit configuration.
pub fn init_with(config: &ObservabilityConfig) {
    tracing::init_with(config);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::ObservabilityConfig;
