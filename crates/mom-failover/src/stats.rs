//! Receive statistics for a subscription.
//!
//! The counters are updated by whoever drives the receive loop and read by
//! diagnostic code. Every update is a single atomic operation; there is no
//! ordering between different counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lock-free receive counters.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    /// Receive calls currently in progress.
    in_flight: AtomicUsize,
    /// Completed receive calls, including ones that timed out empty.
    receive_count: AtomicU64,
    /// Receive calls that returned a message.
    received_message_count: AtomicU64,
    /// Receive calls that failed.
    error_count: AtomicU64,
}

impl SubscriptionStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a receive call.
    pub fn notify_before_receive(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks the end of a receive call.
    pub fn notify_after_receive(&self) {
        // Unbalanced calls must not wrap the counter around.
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Records the outcome of a receive call that did not fail.
    pub fn notify_receive_message<M>(&self, message: Option<&M>) {
        self.receive_count.fetch_add(1, Ordering::Relaxed);
        if message.is_some() {
            self.received_message_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a failed receive call.
    pub fn notify_receive_error(&self, _error: &dyn std::error::Error) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the start of a receive call and returns a guard that marks its
    /// end when dropped.
    pub fn enter_receive(&self) -> ReceiveGuard<'_> {
        self.notify_before_receive();
        ReceiveGuard { stats: self }
    }

    /// Returns `true` while at least one receive call is in progress.
    pub fn invoking_receive(&self) -> bool {
        self.in_flight() > 0
    }

    /// Number of receive calls in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Total receive calls, including empty ones.
    pub fn receive_count(&self) -> u64 {
        self.receive_count.load(Ordering::Relaxed)
    }

    /// Receive calls that returned a message.
    pub fn received_message_count(&self) -> u64 {
        self.received_message_count.load(Ordering::Relaxed)
    }

    /// Failed receive calls.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// A point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invoking_receive: self.invoking_receive(),
            receive_count: self.receive_count(),
            received_message_count: self.received_message_count(),
            error_count: self.error_count(),
        }
    }
}

/// Marks a receive call as in progress for as long as it lives.
#[derive(Debug)]
pub struct ReceiveGuard<'a> {
    stats: &'a SubscriptionStats,
}

impl Drop for ReceiveGuard<'_> {
    fn drop(&mut self) {
        self.stats.notify_after_receive();
    }
}

/// Serializable copy of [`SubscriptionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Whether a receive call was in progress.
    pub invoking_receive: bool,
    /// Total receive calls.
    pub receive_count: u64,
    /// Receive calls that returned a message.
    pub received_message_count: u64,
    /// Failed receive calls.
    pub error_count: u64,
}
