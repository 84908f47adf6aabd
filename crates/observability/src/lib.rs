//! Tracing and logging setup shared by every boxflow entry point.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LoggingSettings;

/// Initialize process-wide tracing with defaults (`RUST_LOG`, else `info`; JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init_with(&LoggingSettings::default());
}

/// Initialize process-wide tracing from configured settings.
pub fn init_with(settings: &LoggingSettings) {
    crate::tracing::init_with(settings);
}
