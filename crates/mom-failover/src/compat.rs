//! Timed receive for providers with and without a native timed receive.
//!
//! Newer providers expose [`TimedReceive`](crate::TimedReceive) through
//! [`SessionProvider::timed_receive`]; older ones only hand out plain
//! consumers. [`receive_with_timeout`] serves both so callers never have to
//! check which kind they hold.

use crate::error::TransportError;
use crate::stats::SubscriptionStats;
use crate::transport::{MessageConsumer, SessionProvider, SubscribeInput};
use std::time::Duration;

/// Receives the next message for `subscription` from `provider`.
///
/// A zero `timeout` blocks until a message arrives. Without a native timed
/// receive, a consumer is obtained from the provider and the provider's
/// statistics (if any) are updated around the call.
pub async fn receive_with_timeout<P>(
    provider: &P,
    subscription: &SubscribeInput,
    timeout: Duration,
) -> Result<Option<P::Message>, TransportError>
where
    P: SessionProvider,
{
    if let Some(timed) = provider.timed_receive() {
        return timed.receive(subscription, timeout).await;
    }

    let consumer = provider.consumer(subscription).await?;
    let stats = provider.stats();
    let _guard = stats.as_deref().map(SubscriptionStats::enter_receive);

    let result = if timeout.is_zero() {
        consumer.receive().await
    } else {
        consumer.receive_timeout(timeout).await
    };

    if let Some(stats) = stats.as_deref() {
        match &result {
            Ok(message) => stats.notify_receive_message(message.as_ref()),
            Err(error) => stats.notify_receive_error(error),
        }
    }

    result
}
