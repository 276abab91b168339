//! The transport contract consumed by the failover wrappers.
//!
//! The wrappers never talk to a broker themselves. A transport client
//! library plugs in by implementing [`Connection`], [`Session`] and
//! [`SessionProvider`] and by handing the wrappers two factories: one that
//! opens connections and one that builds a provider on top of a fresh
//! session.
//!
//! Receiving with a timeout is an optional capability. Providers that can
//! do it natively expose it through [`SessionProvider::timed_receive`];
//! everyone else is served by [`crate::compat::receive_with_timeout`], which
//! falls back to a plain [`MessageConsumer`].

use crate::error::TransportError;
use crate::stats::SubscriptionStats;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked by a connection when the broker reports a failure
/// asynchronously. It may be called from any thread.
pub type ExceptionListener = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Creates new physical connections.
pub type ConnectionFactory<C> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<C, TransportError>> + Send + Sync>;

/// Builds a session provider on top of a freshly created session.
pub type SessionProviderFactory<S, P> =
    Arc<dyn Fn(S) -> BoxFuture<'static, Result<P, TransportError>> + Send + Sync>;

/// Wraps an async closure into a [`ConnectionFactory`].
pub fn connection_factory<C, F, Fut>(f: F) -> ConnectionFactory<C>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, TransportError>> + Send + 'static,
{
    Arc::new(move || -> BoxFuture<'static, Result<C, TransportError>> { Box::pin(f()) })
}

/// Wraps an async closure into a [`SessionProviderFactory`].
pub fn session_provider_factory<S, P, F, Fut>(f: F) -> SessionProviderFactory<S, P>
where
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, TransportError>> + Send + 'static,
{
    Arc::new(move |session| -> BoxFuture<'static, Result<P, TransportError>> {
        Box::pin(f(session))
    })
}

/// A physical connection to a message broker.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// The session type this connection creates.
    type Session: Session;

    /// Creates a session, transacted or auto-acknowledge.
    async fn create_session(&self, transacted: bool) -> Result<Self::Session, TransportError>;

    /// Installs the listener for asynchronous broker failures, replacing any
    /// previous one.
    fn set_exception_listener(&self, listener: ExceptionListener);

    /// Closes the connection and everything derived from it.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A session handle. Handles are cheap to clone and refer to the same
/// underlying session.
#[async_trait]
pub trait Session: Clone + Send + Sync + 'static {
    /// Closes the session.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A temporary queue bound to the connection that created it.
#[async_trait]
pub trait TemporaryQueue: Clone + Send + Sync + 'static {
    /// Deletes the queue on the broker.
    async fn delete(&self) -> Result<(), TransportError>;
}

/// The minimal receive capability every consumer offers.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// The message type delivered by this consumer.
    type Message: Send + 'static;

    /// Blocks until a message arrives. `None` means the consumer was closed.
    async fn receive(&self) -> Result<Option<Self::Message>, TransportError>;

    /// Waits at most `timeout` for a message. `None` means nothing arrived.
    async fn receive_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Self::Message>, TransportError>;
}

/// Extended receive capability: receive for a subscription with a timeout in
/// a single call.
#[async_trait]
pub trait TimedReceive<M: Send + 'static>: Send + Sync {
    /// Receives the next message for `subscription`. A zero `timeout` blocks
    /// until a message arrives.
    async fn receive(
        &self,
        subscription: &SubscribeInput,
        timeout: Duration,
    ) -> Result<Option<M>, TransportError>;
}

/// The bundle of a session and the producer, consumers and temporary queue
/// derived from it.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// The raw session type.
    type Session: Session;
    /// The producer type.
    type Producer: Send + 'static;
    /// The consumer type.
    type Consumer: MessageConsumer<Message = Self::Message> + 'static;
    /// The temporary queue type.
    type Queue: TemporaryQueue;
    /// The message type.
    type Message: Send + 'static;

    /// Returns the underlying session.
    async fn session(&self) -> Result<Self::Session, TransportError>;

    /// Returns the producer, creating it on first use.
    async fn producer(&self) -> Result<Self::Producer, TransportError>;

    /// Returns a consumer for `subscription`.
    async fn consumer(
        &self,
        subscription: &SubscribeInput,
    ) -> Result<Self::Consumer, TransportError>;

    /// Returns the temporary queue, creating it on first use.
    async fn temporary_queue(&self) -> Result<Self::Queue, TransportError>;

    /// Closes the session and everything derived from it.
    async fn close(&self) -> Result<(), TransportError>;

    /// Live receive statistics, if this provider records them.
    fn stats(&self) -> Option<Arc<SubscriptionStats>> {
        None
    }

    /// The extended receive capability, if this provider has one.
    fn timed_receive(&self) -> Option<&dyn TimedReceive<Self::Message>> {
        None
    }
}

/// Acknowledgement mode of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acknowledgement {
    /// Messages are acknowledged as soon as they are received.
    #[default]
    Auto,
    /// Messages are acknowledged when the session transaction commits.
    Transacted,
}

/// Subscription settings, passed through to the transport untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscribeInput {
    destination: String,
    acknowledgement: Acknowledgement,
    selector: Option<String>,
    durable_name: Option<String>,
}

impl SubscribeInput {
    /// Creates an auto-acknowledge subscription to `destination`.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Sets the acknowledgement mode.
    pub fn acknowledgement(mut self, acknowledgement: Acknowledgement) -> Self {
        self.acknowledgement = acknowledgement;
        self
    }

    /// Sets a message selector.
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Makes the subscription durable under `name`.
    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }

    /// The destination name.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The acknowledgement mode.
    pub fn acknowledgement_mode(&self) -> Acknowledgement {
        self.acknowledgement
    }

    /// The message selector, if any.
    pub fn message_selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// The durable subscription name, if any.
    pub fn durable_name(&self) -> Option<&str> {
        self.durable_name.as_deref()
    }

    /// Returns `true` if messages are acknowledged transactionally.
    pub fn is_transacted(&self) -> bool {
        self.acknowledgement == Acknowledgement::Transacted
    }
}
