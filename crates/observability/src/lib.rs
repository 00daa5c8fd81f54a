//! Tracing/logging setup shared by binaries.

/// Initialize process-wide tracing using `LOG_FORMAT` (`json` or `pretty`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::LogFormat;
