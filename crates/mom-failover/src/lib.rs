//! Transparent connection and session failover for message-oriented
//! middleware clients.
//!
//! A [`ConnectionWrapper`] owns one logical broker connection. It connects
//! lazily through an injected factory, retries failed connects with a
//! configurable backoff, and discards the connection when the transport
//! reports a broker-side failure. Any number of [`SessionWrapper`]s share it;
//! each owns one session provider (session, producer, consumers and
//! temporary queue) and recreates it transparently after the connection was
//! replaced.
//!
//! # Retry semantics
//!
//! - Connecting is retried up to `retry_count` times after the first failure.
//!   A retry count of zero disables failover entirely.
//! - Every session operation is retried at most once per call, after the
//!   session retry interval. Callers that need more must loop themselves.
//! - Only retryable transport errors are retried (see
//!   [`TransportError::is_retryable`]).
//! - After `close`, every operation fails with [`FailoverError::Closed`].
//!
//! # Example
//!
//! ```no_run
//! use mom_failover::{
//!     Connection, ConnectionFactory, ConnectionWrapper, FailoverError, SessionProvider,
//!     SessionProviderFactory, SessionWrapper, SubscribeInput,
//! };
//! use std::time::Duration;
//!
//! async fn drain<C, P>(
//!     connect: ConnectionFactory<C>,
//!     provide: SessionProviderFactory<C::Session, P>,
//! ) -> Result<usize, FailoverError>
//! where
//!     C: Connection,
//!     P: SessionProvider<Session = C::Session>,
//! {
//!     let connection = ConnectionWrapper::builder(connect)
//!         .name("orders")
//!         .retry_count(5)
//!         .retry_interval(Duration::from_millis(500))
//!         .on_connect_retry(|attempt, delay| {
//!             println!("connect attempt {attempt} failed, next in {delay:?}");
//!         })
//!         .build();
//!     let session = SessionWrapper::new(&connection, false, provide);
//!     let subscription = SubscribeInput::new("orders");
//!
//!     let mut received = 0;
//!     while session
//!         .receive(&subscription, Duration::from_secs(1))
//!         .await?
//!         .is_some()
//!     {
//!         received += 1;
//!     }
//!
//!     connection.close().await;
//!     Ok(received)
//! }
//! ```
//!
//! # Feature flags
//!
//! - `tracing`: log retry and failover decisions with the `tracing` crate.
//! - `metrics`: record connection attempts, invalidations and session
//!   retries with the `metrics` crate.

pub mod compat;
mod config;
mod connection;
mod error;
mod events;
mod registry;
mod service;
mod session;
mod state;
mod stats;
mod transport;

pub use compat::receive_with_timeout;
pub use config::{ConnectionWrapperBuilder, FailoverConfig, FailoverDefaults};
pub use connection::ConnectionWrapper;
pub use error::{FailoverError, Result, TransportError};
pub use events::{ConnectionEvent, SessionEvent};
pub use service::{ReceiveRequest, ReceiveService};
pub use session::SessionWrapper;
pub use state::ConnectionState;
pub use stats::{ReceiveGuard, StatsSnapshot, SubscriptionStats};
pub use transport::{
    connection_factory, session_provider_factory, Acknowledgement, Connection,
    ConnectionFactory, ExceptionListener, MessageConsumer, Session, SessionProvider,
    SessionProviderFactory, SubscribeInput, TemporaryQueue, TimedReceive,
};

pub use mom_failover_core::{
    ExponentialBackoff, FixedInterval, FnInterval, IntervalFunction, Interrupted,
};
pub use tokio_util::sync::CancellationToken;
