//! Session wrapper tests.
//!
//! Test organization:
//! - operations.rs: lazy provider creation and the operation surface
//! - failover.rs: the single retry per call and recovery after failover
//! - temporary_queue.rs: temporary queue bookkeeping and its close-only delete

mod operations;
mod temporary_queue;
