//! Connection wrapper tests.
//!
//! Test organization:
//! - lifecycle.rs: lazy connect, invalidate, close and diagnostics
//! - retry.rs: retry bound, backoff timing and interruption
//! - concurrency.rs: concurrent callers and asynchronous broker failures

mod concurrency;
