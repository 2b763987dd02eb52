//! Shared helpers for integration tests.
#![allow(dead_code)]

pub mod synthetic;

/// Install a test-friendly `tracing` subscriber once per test binary.
/// Set `RUST_LOG`-style filtering through `TEST_LOG=debug` when digging.
pub fn init_tracing() {
    let level = match std::env::var("TEST_LOG").as_deref() {
        Ok("trace") => tracing::Level::TRACE,
        Ok("debug") => tracing::Level::DEBUG,
        _ => tracing::Level::WARN,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_test_writer()
        .try_init();
}
