//! Session wrapper: one logical session on top of a [`ConnectionWrapper`].
//!
//! The session provider (session, producer, consumers and temporary queue)
//! is created lazily against whatever connection the connection wrapper
//! currently holds, and recreated after an invalidation. Every operation is
//! attempted once and, on a retryable transport failure, retried exactly
//! once after the session retry interval. Connection-level recovery is left
//! to the connection wrapper's own retry loop.
//!
//! The provider lock is only held while the provider is looked up or
//! created, never while the provider is in use, so a long blocking receive
//! does not hold up an invalidation fanned out by the connection.

use crate::compat;
use crate::connection::ConnectionWrapper;
use crate::error::{FailoverError, Result, TransportError};
use crate::registry::ManagedSession;
use crate::service::ReceiveService;
use crate::stats::SubscriptionStats;
use crate::transport::{
    Connection, Session, SessionProvider, SessionProviderFactory, SubscribeInput,
    TemporaryQueue,
};
use async_trait::async_trait;
use mom_failover_core::wait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;

struct SessionSlot<P: SessionProvider> {
    provider: Option<Arc<P>>,
    temporary_queue: Option<P::Queue>,
}

/// Owns the lifecycle of one logical session.
///
/// Registered with its connection wrapper for its whole lifetime; dropping
/// the wrapper unregisters it.
pub struct SessionWrapper<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    id: u64,
    connection: Arc<ConnectionWrapper<C>>,
    transacted: bool,
    factory: SessionProviderFactory<C::Session, P>,
    slot: Mutex<SessionSlot<P>>,
    closing: AtomicBool,
}

impl<C, P> SessionWrapper<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    /// Creates a session wrapper bound to `connection`. No session is created
    /// until first use.
    ///
    /// On a closing connection the wrapper starts out closed and is never
    /// registered.
    pub fn new(
        connection: &Arc<ConnectionWrapper<C>>,
        transacted: bool,
        factory: SessionProviderFactory<C::Session, P>,
    ) -> Arc<Self> {
        let id = connection.next_session_id();
        let closing = connection.is_closing();
        let session = Arc::new(Self {
            id,
            connection: Arc::clone(connection),
            transacted,
            factory,
            slot: Mutex::new(SessionSlot {
                provider: None,
                temporary_queue: None,
            }),
            closing: AtomicBool::new(closing),
        });

        if !closing {
            let weak: Weak<Self> = Arc::downgrade(&session);
            let managed: Weak<dyn ManagedSession> = weak;
            connection.register_session(id, managed);
        }
        session
    }

    /// Returns the underlying session.
    pub async fn session(&self) -> Result<C::Session> {
        self.invoke("session", |provider| async move { provider.session().await })
            .await
    }

    /// Returns the producer.
    pub async fn producer(&self) -> Result<P::Producer> {
        self.invoke("producer", |provider| async move { provider.producer().await })
            .await
    }

    /// Returns a consumer for `subscription`.
    pub async fn consumer(&self, subscription: &SubscribeInput) -> Result<P::Consumer> {
        self.invoke("consumer", |provider| async move {
            provider.consumer(subscription).await
        })
        .await
    }

    /// Receives the next message for `subscription`.
    ///
    /// A zero `timeout` blocks until a message arrives; otherwise `Ok(None)`
    /// is returned when nothing arrives in time. Providers with a native
    /// timed receive are used directly, everyone else goes through
    /// [`compat::receive_with_timeout`].
    pub async fn receive(
        &self,
        subscription: &SubscribeInput,
        timeout: Duration,
    ) -> Result<Option<P::Message>> {
        self.invoke("receive", |provider| async move {
            compat::receive_with_timeout(provider.as_ref(), subscription, timeout).await
        })
        .await
    }

    /// Returns the temporary queue of this session, creating it on first use.
    ///
    /// The queue is remembered so that [`close`](Self::close) can delete it,
    /// unless the provider that created it was discarded in the meantime: such
    /// a queue lives and dies with the old connection.
    pub async fn temporary_queue(&self) -> Result<P::Queue> {
        let (creator, queue) = self
            .invoke("temporary_queue", |provider| async move {
                let queue = provider.temporary_queue().await?;
                Ok::<_, TransportError>((provider, queue))
            })
            .await?;

        let mut slot = self.slot.lock().await;
        if self.is_closing() {
            drop(slot);
            self.delete_quietly(&queue).await;
            return Err(FailoverError::session_closed());
        }

        let current = slot
            .provider
            .as_ref()
            .is_some_and(|provider| Arc::ptr_eq(provider, &creator));
        if current {
            slot.temporary_queue = Some(queue.clone());
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.connection.config().name(),
                session = self.id,
                "temporary queue outlived its session provider"
            );
        }
        Ok(queue)
    }

    /// Deletes the temporary queue, if one was created.
    ///
    /// Only allowed while the wrapper is closing; otherwise fails with
    /// [`FailoverError::Precondition`] without touching the transport.
    pub async fn delete_temporary_queue(&self) -> Result<()> {
        if !self.is_closing() {
            return Err(FailoverError::Precondition(
                "temporary queue can only be deleted while the session is closing",
            ));
        }

        let queue = self.slot.lock().await.temporary_queue.take();
        match queue {
            Some(queue) => Ok(queue.delete().await?),
            None => Ok(()),
        }
    }

    /// Discards the session provider so the next operation recreates it.
    /// The wrapper itself stays usable.
    pub async fn invalidate(&self) {
        let provider = {
            let mut slot = self.slot.lock().await;
            slot.temporary_queue = None;
            slot.provider.take()
        };

        if let Some(provider) = provider {
            self.retire(&provider).await;
        }
    }

    /// Closes the wrapper: deletes the temporary queue, closes the session
    /// provider and unregisters from the connection wrapper. Idempotent.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(_error) = self.delete_temporary_queue().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.connection.config().name(),
                session = self.id,
                error = %_error,
                "ignoring failure while deleting temporary queue"
            );
        }

        let provider = self.slot.lock().await.provider.take();
        if let Some(provider) = provider {
            self.close_quietly(&provider).await;
        }

        self.connection.unregister_session(self.id);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            connection = %self.connection.config().name(),
            session = self.id,
            "session wrapper closed"
        );

        self.connection.config().hooks.session_closed(self.id);
    }

    /// Live statistics of the current provider, if it has any.
    pub async fn stats(&self) -> Option<Arc<SubscriptionStats>> {
        let slot = self.slot.lock().await;
        slot.provider.as_ref().and_then(|provider| provider.stats())
    }

    /// `true` once [`close`](Self::close) was called.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// `true` while a session provider is held.
    pub async fn has_session_provider(&self) -> bool {
        self.slot.lock().await.provider.is_some()
    }

    /// Id of this wrapper within its connection wrapper.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether sessions are created transacted.
    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    /// The owning connection wrapper.
    pub fn connection(&self) -> &Arc<ConnectionWrapper<C>> {
        &self.connection
    }

    /// A [`tower::Service`] receiving through this wrapper.
    pub fn receive_service(self: &Arc<Self>) -> ReceiveService<C, P> {
        ReceiveService::new(Arc::clone(self))
    }

    /// Runs `call` against the provider, retrying once after the session
    /// retry interval if the first attempt fails with a retryable error.
    async fn invoke<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let error = match self.attempt(&mut call).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable()
            || !self.connection.config().failover_enabled()
            || self.is_closing()
        {
            return Err(error);
        }

        let delay = self.connection.config().session_retry_delay();

        #[cfg(feature = "tracing")]
        tracing::warn!(
            connection = %self.connection.config().name(),
            session = self.id,
            operation,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "session operation failed, retrying once"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "mom_session_retries_total",
            "connection" => self.connection_name(),
            "operation" => operation
        )
        .increment(1);

        self.connection
            .config()
            .hooks
            .session_retry(self.id, operation, delay);

        if let Err(interrupted) = wait(delay, self.connection.shutdown_token()).await {
            if self.is_closing() || self.connection.is_closing() {
                return Err(FailoverError::session_closed());
            }
            return Err(interrupted.into());
        }

        self.attempt(&mut call).await
    }

    async fn attempt<T, F, Fut>(&self, call: &mut F) -> Result<T>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let provider = {
            let mut slot = self.slot.lock().await;
            self.try_session_provider(&mut slot).await?
        };

        match call(Arc::clone(&provider)).await {
            Ok(value) => Ok(value),
            Err(error) => {
                if error.is_retryable() {
                    self.discard(&provider).await;
                }
                Err(error.into())
            }
        }
    }

    async fn try_session_provider(&self, slot: &mut SessionSlot<P>) -> Result<Arc<P>> {
        if self.is_closing() {
            return Err(FailoverError::session_closed());
        }

        if let Some(provider) = slot.provider.as_ref() {
            return Ok(Arc::clone(provider));
        }

        let connection = self.connection.get_connection().await?;
        let session = connection.create_session(self.transacted).await?;

        let provider = match (self.factory)(session.clone()).await {
            Ok(provider) => Arc::new(provider),
            Err(error) => {
                if let Err(_close_error) = session.close().await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        connection = %self.connection.config().name(),
                        session = self.id,
                        error = %_close_error,
                        "ignoring failure while closing session"
                    );
                }
                return Err(error.into());
            }
        };
        slot.provider = Some(Arc::clone(&provider));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            connection = %self.connection.config().name(),
            session = self.id,
            transacted = self.transacted,
            "session provider created"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "mom_session_providers_created_total",
            "connection" => self.connection_name()
        )
        .increment(1);

        self.connection.config().hooks.provider_created(self.id);

        Ok(provider)
    }

    /// Drops `provider` if it is still the current one.
    async fn discard(&self, provider: &Arc<P>) {
        let current = {
            let mut slot = self.slot.lock().await;
            match slot.provider.as_ref() {
                Some(current) if Arc::ptr_eq(current, provider) => {
                    slot.temporary_queue = None;
                    slot.provider.take()
                }
                _ => None,
            }
        };

        if let Some(provider) = current {
            self.retire(&provider).await;
        }
    }

    async fn retire(&self, provider: &P) {
        self.close_quietly(provider).await;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            connection = %self.connection.config().name(),
            session = self.id,
            "session provider discarded"
        );

        self.connection.config().hooks.provider_invalidated(self.id);
    }

    async fn close_quietly(&self, provider: &P) {
        if let Err(_error) = provider.close().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.connection.config().name(),
                session = self.id,
                error = %_error,
                "ignoring failure while closing session provider"
            );
        }
    }

    async fn delete_quietly(&self, queue: &P::Queue) {
        if let Err(_error) = queue.delete().await {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                connection = %self.connection.config().name(),
                session = self.id,
                error = %_error,
                "ignoring failure while deleting temporary queue"
            );
        }
    }

    #[cfg(feature = "metrics")]
    fn connection_name(&self) -> String {
        self.connection.config().name().to_string()
    }
}

#[async_trait]
impl<C, P> ManagedSession for SessionWrapper<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    async fn invalidate(&self) {
        SessionWrapper::invalidate(self).await;
    }

    async fn close(&self) {
        SessionWrapper::close(self).await;
    }
}

impl<C, P> Drop for SessionWrapper<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    fn drop(&mut self) {
        self.connection.unregister_session(self.id);
    }
}

impl<C, P> std::fmt::Debug for SessionWrapper<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWrapper")
            .field("id", &self.id)
            .field("connection", &self.connection.config().name())
            .field("transacted", &self.transacted)
            .field("closing", &self.is_closing())
            .finish()
    }
}
