//! Per-request cancellation.
//!
//! One signal covers a whole `send` call: every hop subscribes, and a
//! trigger aborts whichever exchange is in flight.

use tokio::sync::broadcast;

/// Cancellation signal for an in-flight request.
///
/// Triggering aborts the current exchange's response channel and drops the
/// handler's future. Dropping the signal without triggering never cancels.
pub struct Cancellation {
    tx: broadcast::Sender<()>,
}

impl Cancellation {
    /// Create a new, untriggered signal.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves only on a real trigger; a dropped [`Cancellation`] parks forever.
pub(crate) async fn cancelled(mut rx: broadcast::Receiver<()>) {
    match rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => (),
        Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
    }
}
