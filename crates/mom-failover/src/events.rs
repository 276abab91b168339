//! Lifecycle events of a connection wrapper and its sessions.
//!
//! Callbacks registered on the builder end up in one [`Hooks`] value owned
//! by the wrapper's configuration. The wrapper and every session wrapper
//! report through it, so each event carries the connection name without the
//! call sites having to repeat it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events emitted by a connection wrapper.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A physical connection was established.
    Connected {
        connection_name: String,
        timestamp: Instant,
        /// Failed attempts that preceded this success.
        failed_attempts: u32,
    },
    /// A connect attempt failed and another one is scheduled after `delay`.
    ConnectRetry {
        connection_name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
    },
    /// Connecting failed and no further attempt is made in this call.
    RetriesExhausted {
        connection_name: String,
        timestamp: Instant,
        attempts: u32,
        /// `false` when the wrapper was built with a retry count of zero.
        failover_configured: bool,
    },
    /// The current connection was discarded.
    Invalidated {
        connection_name: String,
        timestamp: Instant,
        had_connection: bool,
    },
    /// The wrapper was closed.
    Closed {
        connection_name: String,
        timestamp: Instant,
    },
}

impl ConnectionEvent {
    /// Short name of the event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected { .. } => "Connected",
            ConnectionEvent::ConnectRetry { .. } => "ConnectRetry",
            ConnectionEvent::RetriesExhausted { .. } => "RetriesExhausted",
            ConnectionEvent::Invalidated { .. } => "Invalidated",
            ConnectionEvent::Closed { .. } => "Closed",
        }
    }

    pub fn timestamp(&self) -> Instant {
        match self {
            ConnectionEvent::Connected { timestamp, .. }
            | ConnectionEvent::ConnectRetry { timestamp, .. }
            | ConnectionEvent::RetriesExhausted { timestamp, .. }
            | ConnectionEvent::Invalidated { timestamp, .. }
            | ConnectionEvent::Closed { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the wrapper that emitted the event.
    pub fn connection_name(&self) -> &str {
        match self {
            ConnectionEvent::Connected {
                connection_name, ..
            }
            | ConnectionEvent::ConnectRetry {
                connection_name, ..
            }
            | ConnectionEvent::RetriesExhausted {
                connection_name, ..
            }
            | ConnectionEvent::Invalidated {
                connection_name, ..
            }
            | ConnectionEvent::Closed {
                connection_name, ..
            } => connection_name,
        }
    }
}

/// Events emitted by the session wrappers of a connection.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session provider was created.
    ProviderCreated {
        connection_name: String,
        timestamp: Instant,
        session_id: u64,
    },
    /// The session provider was discarded, by failover or by a failed call.
    ProviderInvalidated {
        connection_name: String,
        timestamp: Instant,
        session_id: u64,
    },
    /// A failed operation is retried once after `delay`.
    Retry {
        connection_name: String,
        timestamp: Instant,
        session_id: u64,
        operation: &'static str,
        delay: Duration,
    },
    /// The session wrapper was closed.
    Closed {
        connection_name: String,
        timestamp: Instant,
        session_id: u64,
    },
}

impl SessionEvent {
    /// Short name of the event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::ProviderCreated { .. } => "ProviderCreated",
            SessionEvent::ProviderInvalidated { .. } => "ProviderInvalidated",
            SessionEvent::Retry { .. } => "Retry",
            SessionEvent::Closed { .. } => "Closed",
        }
    }

    pub fn timestamp(&self) -> Instant {
        match self {
            SessionEvent::ProviderCreated { timestamp, .. }
            | SessionEvent::ProviderInvalidated { timestamp, .. }
            | SessionEvent::Retry { timestamp, .. }
            | SessionEvent::Closed { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the connection wrapper the session belongs to.
    pub fn connection_name(&self) -> &str {
        match self {
            SessionEvent::ProviderCreated {
                connection_name, ..
            }
            | SessionEvent::ProviderInvalidated {
                connection_name, ..
            }
            | SessionEvent::Retry {
                connection_name, ..
            }
            | SessionEvent::Closed {
                connection_name, ..
            } => connection_name,
        }
    }

    /// The id of the session wrapper that emitted the event.
    pub fn session_id(&self) -> u64 {
        match self {
            SessionEvent::ProviderCreated { session_id, .. }
            | SessionEvent::ProviderInvalidated { session_id, .. }
            | SessionEvent::Retry { session_id, .. }
            | SessionEvent::Closed { session_id, .. } => *session_id,
        }
    }
}

type Hook<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Callbacks of one connection wrapper, shared with its session wrappers.
///
/// Events are reported from inside the wrappers' critical sections, so a
/// panicking callback is caught and the remaining callbacks still run.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    connection_name: String,
    connection: Vec<Hook<ConnectionEvent>>,
    session: Vec<Hook<SessionEvent>>,
}

impl Hooks {
    pub(crate) fn named(mut self, connection_name: &str) -> Self {
        self.connection_name = connection_name.to_string();
        self
    }

    pub(crate) fn on_connection<F>(&mut self, hook: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection.push(Arc::new(hook));
    }

    pub(crate) fn on_session<F>(&mut self, hook: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.session.push(Arc::new(hook));
    }

    pub(crate) fn connected(&self, failed_attempts: u32) {
        self.report_connection(ConnectionEvent::Connected {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            failed_attempts,
        });
    }

    pub(crate) fn connect_retry(&self, attempt: u32, delay: Duration) {
        self.report_connection(ConnectionEvent::ConnectRetry {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            attempt,
            delay,
        });
    }

    pub(crate) fn retries_exhausted(&self, attempts: u32, failover_configured: bool) {
        self.report_connection(ConnectionEvent::RetriesExhausted {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            attempts,
            failover_configured,
        });
    }

    pub(crate) fn invalidated(&self, had_connection: bool) {
        self.report_connection(ConnectionEvent::Invalidated {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            had_connection,
        });
    }

    pub(crate) fn closed(&self) {
        self.report_connection(ConnectionEvent::Closed {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
        });
    }

    pub(crate) fn provider_created(&self, session_id: u64) {
        self.report_session(SessionEvent::ProviderCreated {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            session_id,
        });
    }

    pub(crate) fn provider_invalidated(&self, session_id: u64) {
        self.report_session(SessionEvent::ProviderInvalidated {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            session_id,
        });
    }

    pub(crate) fn session_retry(&self, session_id: u64, operation: &'static str, delay: Duration) {
        self.report_session(SessionEvent::Retry {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            session_id,
            operation,
            delay,
        });
    }

    pub(crate) fn session_closed(&self, session_id: u64) {
        self.report_session(SessionEvent::Closed {
            connection_name: self.connection_name.clone(),
            timestamp: Instant::now(),
            session_id,
        });
    }

    #[cfg(test)]
    pub(crate) fn connection_hooks(&self) -> usize {
        self.connection.len()
    }

    #[cfg(test)]
    pub(crate) fn session_hooks(&self) -> usize {
        self.session.len()
    }

    fn report_connection(&self, event: ConnectionEvent) {
        if !self.connection.is_empty() {
            run_hooks(&self.connection, &event);
        }
    }

    fn report_session(&self, event: SessionEvent) {
        if !self.session.is_empty() {
            run_hooks(&self.session, &event);
        }
    }
}

fn run_hooks<E: fmt::Debug>(hooks: &[Hook<E>], event: &E) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook(event))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!(?event, "event callback panicked");
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("connection", &self.connection.len())
            .field("session", &self.session.len())
            .finish()
    }
}
