use crate::error::{FailoverError, Result};
use crate::session::SessionWrapper;
use crate::transport::{Connection, SessionProvider, SubscribeInput};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A receive call served by [`ReceiveService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// The subscription to receive from.
    pub subscription: SubscribeInput,
    /// How long to wait. Zero blocks until a message arrives.
    pub timeout: Duration,
}

impl ReceiveRequest {
    /// Creates a request that waits at most `timeout`.
    pub fn new(subscription: SubscribeInput, timeout: Duration) -> Self {
        Self {
            subscription,
            timeout,
        }
    }

    /// Creates a request that blocks until a message arrives.
    pub fn blocking(subscription: SubscribeInput) -> Self {
        Self::new(subscription, Duration::ZERO)
    }
}

/// A [`tower::Service`] that receives through a [`SessionWrapper`].
///
/// Retries and failover are handled by the session wrapper; the service
/// reports not-ready once the wrapper is closed.
pub struct ReceiveService<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    session: Arc<SessionWrapper<C, P>>,
}

impl<C, P> ReceiveService<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    /// Creates a service over `session`.
    pub fn new(session: Arc<SessionWrapper<C, P>>) -> Self {
        Self { session }
    }

    /// The wrapped session.
    pub fn session(&self) -> &Arc<SessionWrapper<C, P>> {
        &self.session
    }
}

impl<C, P> Clone for ReceiveService<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<C, P> Service<ReceiveRequest> for ReceiveService<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    type Response = Option<P::Message>;
    type Error = FailoverError;
    type Future = BoxFuture<'static, Result<Option<P::Message>>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.session.is_closing() {
            return Poll::Ready(Err(FailoverError::session_closed()));
        }
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ReceiveRequest) -> Self::Future {
        let session = Arc::clone(&self.session);
        Box::pin(async move {
            session
                .receive(&request.subscription, request.timeout)
                .await
        })
    }
}

impl<C, P> std::fmt::Debug for ReceiveService<C, P>
where
    C: Connection,
    P: SessionProvider<Session = C::Session>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveService")
            .field("session", &self.session)
            .finish()
    }
}
