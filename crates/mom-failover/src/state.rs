//! Connection state tracking.
//!
//! The state is mirrored into atomics so diagnostics such as
//! [`crate::ConnectionWrapper::is_connected`] never wait for the connection
//! lock. Writers update it while holding that lock; readers may observe a
//! slightly stale value.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Lifecycle state of a connection wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is held.
    Disconnected,

    /// A connection attempt or backoff is in progress.
    Connecting,

    /// A live connection is held.
    Connected,

    /// The wrapper was closed. Terminal.
    Closed,
}

impl ConnectionState {
    fn encode(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Closed => 3,
        }
    }

    fn decode(encoded: u8) -> Self {
        match encoded {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Closed,
        }
    }
}

/// Atomic connection state plus the count of consecutive failed attempts.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: AtomicU8,
    attempts: AtomicU32,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected.encode()),
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::decode(self.state.load(Ordering::Acquire))
    }

    /// Moves to `to` unless the cell is already closed. Returns the previous
    /// state.
    fn transition(&self, to: ConnectionState) -> ConnectionState {
        let closed = ConnectionState::Closed.encode();
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != closed).then_some(to.encode())
            })
            .unwrap_or_else(|current| current);
        ConnectionState::decode(previous)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn mark_connecting(&self) -> ConnectionState {
        self.transition(ConnectionState::Connecting)
    }

    pub(crate) fn mark_connected(&self) -> ConnectionState {
        self.attempts.store(0, Ordering::Release);
        self.transition(ConnectionState::Connected)
    }

    pub(crate) fn mark_disconnected(&self) -> ConnectionState {
        self.transition(ConnectionState::Disconnected)
    }

    pub(crate) fn mark_closed(&self) -> ConnectionState {
        let previous = self
            .state
            .swap(ConnectionState::Closed.encode(), Ordering::AcqRel);
        ConnectionState::decode(previous)
    }
}
