//! Core infrastructure for mom-failover.
//!
//! This crate holds the transport-agnostic pieces the failover wrappers are
//! built from:
//! - Backoff interval functions
//! - Interruptible backoff waits

pub mod backoff;
pub mod wait;

pub use backoff::{ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction};
pub use wait::{wait, Interrupted};
