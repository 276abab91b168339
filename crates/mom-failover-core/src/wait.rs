//! Interruptible backoff waits.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A backoff wait was cut short by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("backoff wait of {delay:?} was interrupted")]
pub struct Interrupted {
    /// The delay that was being waited out.
    pub delay: Duration,
}

/// Waits for `delay` unless `token` is cancelled first.
///
/// An already-cancelled token fails immediately, even for a zero delay.
pub async fn wait(delay: Duration, token: &CancellationToken) -> Result<(), Interrupted> {
    if token.is_cancelled() {
        return Err(Interrupted { delay });
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupted { delay }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
