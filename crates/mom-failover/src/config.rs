use crate::connection::ConnectionWrapper;
use crate::events::{ConnectionEvent, Hooks, SessionEvent};
use crate::transport::{Connection, ConnectionFactory};
use mom_failover_core::{FixedInterval, IntervalFunction};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

static INSTALLED: OnceLock<FailoverDefaults> = OnceLock::new();

static BUILTIN: FailoverDefaults = FailoverDefaults {
    connection_retry_count: 3,
    connection_retry_interval_millis: 1_000,
    session_retry_interval_millis: 1_000,
};

/// Process-wide fallback values for settings a wrapper builder leaves unset.
///
/// Deserializes from any serde format; missing fields take the built-in
/// defaults.
///
/// ```
/// use mom_failover::FailoverDefaults;
///
/// let defaults: FailoverDefaults =
///     serde_json::from_str(r#"{ "connection_retry_count": 5 }"#).unwrap();
/// assert_eq!(defaults.connection_retry_count, 5);
/// assert_eq!(defaults.session_retry_interval_millis, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverDefaults {
    /// Connect retries after the first failure. Zero disables failover.
    pub connection_retry_count: u32,
    /// Wait between connect attempts.
    pub connection_retry_interval_millis: u64,
    /// Wait before a session operation is retried.
    pub session_retry_interval_millis: u64,
}

impl Default for FailoverDefaults {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl FailoverDefaults {
    /// Installs these values as the process-wide defaults.
    ///
    /// Only the first install takes effect; later calls hand their value back.
    pub fn install(self) -> Result<(), FailoverDefaults> {
        INSTALLED.set(self)
    }

    /// The installed defaults, or the built-in ones if nothing was installed.
    pub fn global() -> &'static FailoverDefaults {
        INSTALLED.get().unwrap_or(&BUILTIN)
    }

    fn connection_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connection_retry_interval_millis)
    }

    fn session_retry_interval(&self) -> Duration {
        Duration::from_millis(self.session_retry_interval_millis)
    }
}

/// Resolved configuration of one connection wrapper and its sessions.
pub struct FailoverConfig {
    pub(crate) name: String,
    pub(crate) retry_count: u32,
    pub(crate) retry_interval: Arc<dyn IntervalFunction>,
    pub(crate) session_retry_interval: Arc<dyn IntervalFunction>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) hooks: Hooks,
}

impl FailoverConfig {
    /// Name used in logs, metrics and events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect retries after the first failure.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether failed calls are retried at all.
    pub fn failover_enabled(&self) -> bool {
        self.retry_count > 0
    }

    /// Wait before connect attempt `failures + 1`, given `failures >= 1`.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let attempt = usize::try_from(failures.saturating_sub(1)).unwrap_or(usize::MAX);
        self.retry_interval.next_interval(attempt)
    }

    /// Wait before the single retry of a session operation.
    pub fn session_retry_delay(&self) -> Duration {
        self.session_retry_interval.next_interval(0)
    }

    /// Token whose cancellation interrupts every backoff wait of the wrapper.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl std::fmt::Debug for FailoverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverConfig")
            .field("name", &self.name)
            .field("retry_count", &self.retry_count)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for [`ConnectionWrapper`].
///
/// Settings left unset fall back to [`FailoverDefaults::global`] when
/// [`build`](Self::build) is called.
pub struct ConnectionWrapperBuilder<C> {
    factory: ConnectionFactory<C>,
    name: String,
    retry_count: Option<u32>,
    retry_interval: Option<Arc<dyn IntervalFunction>>,
    session_retry_interval: Option<Arc<dyn IntervalFunction>>,
    cancellation: Option<CancellationToken>,
    hooks: Hooks,
}

impl<C: Connection> ConnectionWrapperBuilder<C> {
    pub(crate) fn new(factory: ConnectionFactory<C>) -> Self {
        Self {
            factory,
            name: "<unnamed>".to_string(),
            retry_count: None,
            retry_interval: None,
            session_retry_interval: None,
            cancellation: None,
            hooks: Hooks::default(),
        }
    }

    /// Sets the name used in logs, metrics and events.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how many times a failed connect is retried. Zero disables
    /// failover for the connection and its sessions.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    /// Waits a fixed `interval` between connect attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(Arc::new(FixedInterval::new(interval)));
        self
    }

    /// Uses a custom backoff between connect attempts. The backoff is
    /// indexed by the number of failures so far, starting at zero.
    pub fn retry_backoff<I>(mut self, backoff: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.retry_interval = Some(Arc::new(backoff));
        self
    }

    /// Waits a fixed `interval` before a session operation is retried.
    pub fn session_retry_interval(mut self, interval: Duration) -> Self {
        self.session_retry_interval = Some(Arc::new(FixedInterval::new(interval)));
        self
    }

    /// Uses a custom backoff before a session operation is retried. Only the
    /// first interval is ever used.
    pub fn session_retry_backoff<I>(mut self, backoff: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.session_retry_interval = Some(Arc::new(backoff));
        self
    }

    /// Links backoff waits to `token`: cancelling it interrupts every pending
    /// wait of the wrapper and its sessions with
    /// [`FailoverError::Interrupted`](crate::FailoverError::Interrupted).
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Registers a callback for established connections.
    ///
    /// The callback receives the number of failed attempts that preceded the
    /// success.
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.hooks.on_connection(move |event| {
            if let ConnectionEvent::Connected {
                failed_attempts, ..
            } = event
            {
                f(*failed_attempts);
            }
        });
        self
    }

    /// Registers a callback for scheduled connect retries.
    ///
    /// The callback receives the number of failed attempts so far and the
    /// delay before the next one.
    pub fn on_connect_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.hooks.on_connection(move |event| {
            if let ConnectionEvent::ConnectRetry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        });
        self
    }

    /// Registers a callback for a connect call that gave up.
    ///
    /// The callback receives the number of attempts made and whether failover
    /// was configured at all.
    pub fn on_retries_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        self.hooks.on_connection(move |event| {
            if let ConnectionEvent::RetriesExhausted {
                attempts,
                failover_configured,
                ..
            } = event
            {
                f(*attempts, *failover_configured);
            }
        });
        self
    }

    /// Registers a callback for invalidations. The callback receives whether
    /// a connection was actually discarded.
    pub fn on_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.hooks.on_connection(move |event| {
            if let ConnectionEvent::Invalidated { had_connection, .. } = event {
                f(*had_connection);
            }
        });
        self
    }

    /// Registers a callback for the close of the wrapper.
    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_connection(move |event| {
            if let ConnectionEvent::Closed { .. } = event {
                f();
            }
        });
        self
    }

    /// Registers a callback for session operations that are retried.
    ///
    /// The callback receives the session id, the operation name and the
    /// delay before the retry.
    pub fn on_session_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &'static str, Duration) + Send + Sync + 'static,
    {
        self.hooks.on_session(move |event| {
            if let SessionEvent::Retry {
                session_id,
                operation,
                delay,
                ..
            } = event
            {
                f(*session_id, operation, *delay);
            }
        });
        self
    }

    /// Registers a callback for discarded session providers. The callback
    /// receives the session id.
    pub fn on_session_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.hooks.on_session(move |event| {
            if let SessionEvent::ProviderInvalidated { session_id, .. } = event {
                f(*session_id);
            }
        });
        self
    }

    /// Registers a callback for every connection event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.hooks.on_connection(f);
        self
    }

    /// Registers a callback for every event of the wrapper's sessions.
    pub fn on_session_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.hooks.on_session(f);
        self
    }

    /// Builds the wrapper. No connection is made until first use.
    pub fn build(self) -> Arc<ConnectionWrapper<C>> {
        self.build_with(FailoverDefaults::global())
    }

    pub(crate) fn build_with(self, defaults: &FailoverDefaults) -> Arc<ConnectionWrapper<C>> {
        let config = FailoverConfig {
            retry_count: self.retry_count.unwrap_or(defaults.connection_retry_count),
            retry_interval: self.retry_interval.unwrap_or_else(|| {
                Arc::new(FixedInterval::new(defaults.connection_retry_interval()))
            }),
            session_retry_interval: self.session_retry_interval.unwrap_or_else(|| {
                Arc::new(FixedInterval::new(defaults.session_retry_interval()))
            }),
            cancellation: self.cancellation.unwrap_or_default(),
            hooks: self.hooks.named(&self.name),
            name: self.name,
        };
        ConnectionWrapper::from_config(self.factory, config)
    }
}

impl<C> std::fmt::Debug for ConnectionWrapperBuilder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWrapperBuilder")
            .field("name", &self.name)
            .field("retry_count", &self.retry_count)
            .field("retry_interval", &self.retry_interval.is_some())
            .field("session_retry_interval", &self.session_retry_interval.is_some())
            .finish()
    }
}
