//! Error types for the failover wrappers.

use mom_failover_core::Interrupted;
use std::time::Duration;

/// Error reported by the underlying transport.
///
/// The variant decides whether a failure is retried: everything except
/// [`TransportError::IllegalState`] is a transport-level failure that the
/// wrappers retry according to their policy. `IllegalState` marks a
/// programming error and is always propagated immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The broker could not be reached.
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// An established connection or session was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The broker rejected the request.
    #[error("broker error: {0}")]
    Broker(String),

    /// The transport object was used incorrectly.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl TransportError {
    /// Returns `true` if this failure is eligible for retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::IllegalState(_))
    }
}

/// Errors returned by connection and session wrapper operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailoverError {
    /// The transport failed and retries did not resolve it. Carries the last
    /// transport error unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The wrapper was closed; nothing is retried after close.
    #[error("{resource} wrapper is closed")]
    Closed {
        /// Which wrapper rejected the call ("connection" or "session").
        resource: &'static str,
    },

    /// A backoff wait was interrupted before the next attempt.
    #[error("interrupted while waiting {delay:?} before the next attempt")]
    Interrupted {
        /// The backoff delay that was cut short.
        delay: Duration,
    },

    /// An operation was called in a state where it is not allowed.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
}

impl FailoverError {
    pub(crate) fn connection_closed() -> Self {
        FailoverError::Closed {
            resource: "connection",
        }
    }

    pub(crate) fn session_closed() -> Self {
        FailoverError::Closed {
            resource: "session",
        }
    }

    /// Returns `true` if this is a closed-resource error.
    pub fn is_closed(&self) -> bool {
        matches!(self, FailoverError::Closed { .. })
    }

    /// Returns `true` if a backoff wait was interrupted.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, FailoverError::Interrupted { .. })
    }

    /// Returns `true` if this wraps a transport error.
    pub fn is_transport(&self) -> bool {
        matches!(self, FailoverError::Transport(_))
    }

    /// Returns `true` if this is a retryable transport error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailoverError::Transport(error) if error.is_retryable())
    }

    /// Returns the transport error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            FailoverError::Transport(error) => Some(error),
            _ => None,
        }
    }
}

impl From<Interrupted> for FailoverError {
    fn from(interrupted: Interrupted) -> Self {
        FailoverError::Interrupted {
            delay: interrupted.delay,
        }
    }
}

/// Result type for failover operations.
pub type Result<T> = std::result::Result<T, FailoverError>;
