//! Tracing subscriber setup.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to
//! the application. With the `logging` feature these helpers install a `fmt`
//! subscriber, otherwise they do nothing.

#[cfg(feature = "logging")]
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a subscriber at `info` unless `RUST_LOG` says otherwise.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info");
}

/// Installs a subscriber at `level` unless `RUST_LOG` says otherwise.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Verbose subscriber writing through the test harness; safe to call from
/// every test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
