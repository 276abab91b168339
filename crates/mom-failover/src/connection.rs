//! Connection wrapper: one logical broker connection with transparent
//! reconnection.
//!
//! The physical connection is created lazily by the injected factory and is
//! swapped out whenever it is invalidated, so callers must fetch it again for
//! every use instead of holding on to it.
//!
//! # Locking
//!
//! The connection slot is guarded by an async mutex that is held for the
//! whole connect-with-retry loop, so concurrent callers never trigger
//! duplicate connects. Session wrappers are tracked in a separate registry
//! with its own short-lived lock. An invalidation takes the connection out
//! of the slot and releases the lock before it fans out to the sessions, so
//! a session racing the fan-out either reconnects or waits for the connect in
//! progress, and never deadlocks against the invalidation.

use crate::config::{ConnectionWrapperBuilder, FailoverConfig};
use crate::error::{FailoverError, Result, TransportError};
use crate::registry::{ManagedSession, SessionRegistry};
use crate::state::{ConnectionState, StateCell};
use crate::transport::{Connection, ConnectionFactory, ExceptionListener};
use mom_failover_core::wait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Owns the lifecycle of one logical broker connection.
///
/// Built with [`ConnectionWrapper::builder`] and always handled through an
/// `Arc`, which session wrappers share.
pub struct ConnectionWrapper<C: Connection> {
    factory: ConnectionFactory<C>,
    config: FailoverConfig,
    connection: Mutex<Option<Arc<C>>>,
    closing: AtomicBool,
    state: StateCell,
    sessions: SessionRegistry,
    shutdown: CancellationToken,
    self_ref: Weak<Self>,
}

impl<C: Connection> ConnectionWrapper<C> {
    /// Starts building a wrapper around `factory`.
    pub fn builder(factory: ConnectionFactory<C>) -> ConnectionWrapperBuilder<C> {
        ConnectionWrapperBuilder::new(factory)
    }

    /// Creates a wrapper that uses the process-wide defaults.
    pub fn new(factory: ConnectionFactory<C>) -> Arc<Self> {
        Self::builder(factory).build()
    }

    pub(crate) fn from_config(factory: ConnectionFactory<C>, config: FailoverConfig) -> Arc<Self> {
        let shutdown = config.cancellation.child_token();
        Arc::new_cyclic(|self_ref| Self {
            factory,
            config,
            connection: Mutex::new(None),
            closing: AtomicBool::new(false),
            state: StateCell::new(),
            sessions: SessionRegistry::new(),
            shutdown,
            self_ref: self_ref.clone(),
        })
    }

    /// Returns the live connection, connecting first if there is none.
    ///
    /// A failed connect is retried up to the configured retry count with the
    /// configured backoff between attempts. Only retryable transport errors
    /// are retried; the last error is returned unchanged once retries are
    /// exhausted. Concurrent callers wait for the one attempt in progress.
    ///
    /// # Errors
    ///
    /// - [`FailoverError::Closed`] once [`close`](Self::close) was called,
    ///   including when the wrapper is closed during a backoff wait.
    /// - [`FailoverError::Interrupted`] when the cancellation token passed to
    ///   the builder fires during a backoff wait.
    /// - [`FailoverError::Transport`] with the last transport error.
    pub async fn get_connection(&self) -> Result<Arc<C>> {
        if self.is_closing() {
            return Err(FailoverError::connection_closed());
        }

        let mut slot = self.connection.lock().await;
        let mut failures: u32 = 0;

        loop {
            if self.is_closing() {
                return Err(FailoverError::connection_closed());
            }

            if let Some(connection) = slot.as_ref() {
                return Ok(Arc::clone(connection));
            }

            self.state.mark_connecting();

            let error = match (self.factory)().await {
                Ok(connection) => {
                    let connection = Arc::new(connection);

                    if self.is_closing() {
                        self.state.mark_disconnected();
                        self.close_quietly(&connection).await;
                        return Err(FailoverError::connection_closed());
                    }

                    if self.config.failover_enabled() {
                        connection.set_exception_listener(self.exception_listener(&connection));
                    }

                    *slot = Some(Arc::clone(&connection));
                    self.state.mark_connected();

                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        connection = %self.config.name,
                        failed_attempts = failures,
                        "connection established"
                    );

                    #[cfg(feature = "metrics")]
                    metrics::counter!(
                        "mom_connection_attempts_total",
                        "connection" => self.config.name.clone(),
                        "result" => "success"
                    )
                    .increment(1);

                    self.config.hooks.connected(failures);

                    return Ok(connection);
                }
                Err(error) => error,
            };

            failures += 1;
            self.state.record_failure();

            #[cfg(feature = "metrics")]
            metrics::counter!(
                "mom_connection_attempts_total",
                "connection" => self.config.name.clone(),
                "result" => "failure"
            )
            .increment(1);

            if !error.is_retryable() {
                self.state.mark_disconnected();
                return Err(error.into());
            }

            if failures > self.config.retry_count {
                self.state.mark_disconnected();
                self.report_exhausted(failures, &error);
                return Err(error.into());
            }

            let delay = self.config.retry_delay(failures);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                connection = %self.config.name,
                attempt = failures,
                retry_count = self.config.retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "connect failed, retrying"
            );

            self.config.hooks.connect_retry(failures, delay);

            if let Err(interrupted) = wait(delay, &self.shutdown).await {
                self.state.mark_disconnected();
                if self.is_closing() {
                    return Err(FailoverError::connection_closed());
                }
                return Err(interrupted.into());
            }
        }
    }

    fn report_exhausted(&self, attempts: u32, error: &TransportError) {
        let failover_configured = self.config.failover_enabled();

        #[cfg(feature = "tracing")]
        if failover_configured {
            tracing::error!(
                connection = %self.config.name,
                attempts,
                error = %error,
                "connection failover exhausted"
            );
        } else {
            tracing::error!(
                connection = %self.config.name,
                error = %error,
                "connect failed and failover is not configured"
            );
        }

        #[cfg(not(feature = "tracing"))]
        let _ = error;

        self.config
            .hooks
            .retries_exhausted(attempts, failover_configured);
    }

    /// Builds the listener installed on every new connection. It invalidates
    /// the wrapper on the runtime that created the connection, and only while
    /// the reporting connection is still the current one.
    fn exception_listener(&self, connection: &Arc<C>) -> ExceptionListener {
        let wrapper = self.self_ref.clone();
        let reporter = Arc::downgrade(connection);
        let runtime = tokio::runtime::Handle::try_current().ok();

        Arc::new(move |error: TransportError| {
            let (Some(wrapper), Some(runtime)) = (wrapper.upgrade(), runtime.as_ref()) else {
                return;
            };
            let reporter = reporter.clone();
            runtime.spawn(async move {
                wrapper.discard(Some(&error), Some(&reporter)).await;
            });
        })
    }

    /// Discards the current connection so the next use reconnects.
    ///
    /// Every registered session wrapper drops its session provider before the
    /// old connection is closed. Idempotent, and leaves the wrapper usable.
    pub async fn invalidate(&self, cause: Option<&TransportError>) {
        self.discard(cause, None).await;
    }

    /// With `only` set, nothing happens unless that connection is still the
    /// current one: reports from replaced connections are stale.
    async fn discard(&self, _cause: Option<&TransportError>, only: Option<&Weak<C>>) {
        let taken = {
            let mut slot = self.connection.lock().await;
            if only.is_some_and(|reporter| !is_same(slot.as_ref(), reporter)) {
                return;
            }
            let taken = slot.take();
            if taken.is_some() {
                self.state.mark_disconnected();
            }
            taken
        };
        let had_connection = taken.is_some();

        for session in self.sessions.snapshot() {
            session.invalidate().await;
        }

        if let Some(connection) = taken {
            self.close_quietly(&connection).await;
        }

        #[cfg(feature = "tracing")]
        match _cause {
            Some(cause) => tracing::info!(
                connection = %self.config.name,
                had_connection,
                cause = %cause,
                "connection invalidated"
            ),
            None => tracing::info!(
                connection = %self.config.name,
                had_connection,
                "connection invalidated"
            ),
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "mom_connection_invalidations_total",
            "connection" => self.config.name.clone()
        )
        .increment(1);

        self.config.hooks.invalidated(had_connection);
    }

    /// Closes the wrapper, every registered session wrapper and the current
    /// connection. Idempotent.
    ///
    /// The closing flag is raised first, so calls racing with the close fail
    /// with [`FailoverError::Closed`] and pending backoff waits end early.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        for session in self.sessions.snapshot() {
            session.close().await;
        }

        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.take() {
            self.close_quietly(&connection).await;
        }
        self.state.mark_closed();
        drop(slot);

        #[cfg(feature = "tracing")]
        tracing::info!(connection = %self.config.name, "connection wrapper closed");

        self.config.hooks.closed();
    }

    async fn close_quietly(&self, connection: &C) {
        if let Err(_error) = connection.close().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.config.name,
                error = %_error,
                "ignoring failure while closing connection"
            );
        }
    }

    /// `true` if not closing and a connection is currently held.
    ///
    /// Lock-free and therefore racy; meant for diagnostics.
    pub fn is_connected(&self) -> bool {
        !self.is_closing() && self.state.state() == ConnectionState::Connected
    }

    /// `true` once [`close`](Self::close) was called.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Consecutive failed connect attempts since the last success.
    pub fn attempts(&self) -> u32 {
        self.state.attempts()
    }

    /// Number of registered session wrappers.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.sessions.next_id()
    }

    pub(crate) fn register_session(&self, id: u64, session: Weak<dyn ManagedSession>) {
        self.sessions.register(id, session);
    }

    pub(crate) fn unregister_session(&self, id: u64) {
        self.sessions.unregister(id);
    }
}

fn is_same<C>(current: Option<&Arc<C>>, reporter: &Weak<C>) -> bool {
    current.is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), reporter.as_ptr()))
}

impl<C: Connection> std::fmt::Debug for ConnectionWrapper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWrapper")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("closing", &self.is_closing())
            .field("sessions", &self.sessions)
            .finish()
    }
}
