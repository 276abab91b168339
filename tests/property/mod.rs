//! Property-based tests for connection and session failover.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate failure scripts and verify that the
//! retry bounds hold for any of them.


use tokio::runtime::{Builder, Runtime};

/// A single-threaded runtime with a paused clock, so backoff waits cost
/// nothing.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}
