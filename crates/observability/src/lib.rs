//! Process-wide logging setup shared by the analytics binaries and tests.

/// Subscriber configuration (filters, output format).
pub mod subscriber;

pub use subscriber::{FORMAT_VAR, LogFormat, init_with};

/// Initialize structured logging, filtered by `RUST_LOG` (default `info`).
///
/// JSON unless `SURPLUS_LOG_FORMAT=pretty`. Safe to call multiple times;
/// subsequent calls are no-ops.
pub fn init() {
    subscriber::init_with(LogFormat::from_env());
}
