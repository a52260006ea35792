//! The application contract: an opaque async callable that receives one
//! exchange and returns when it is done producing the response.

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;

use super::exchange::Exchange;

/// Error type handlers may fail with. A failure aborts the exchange and
/// surfaces to the caller as [`TransportError::Handler`](super::TransportError).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A request handler.
///
/// Implemented for any `Fn(Exchange) -> impl Future<Output = Result<(),
/// HandlerError>>`, so plain async functions and closures work directly.
pub trait Handler: Send + Sync + 'static {
    /// Process one exchange. The handler owns the exchange for its duration;
    /// the response channel inside it is the only way back to the caller.
    fn handle(&self, exchange: Exchange) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, exchange: Exchange) -> BoxFuture<'static, Result<(), HandlerError>> {
        Box::pin(self(exchange))
    }
}

/// Shared, type-erased handler form. This is what crosses the task boundary
/// and what middleware wraps. Method calls auto-deref, so a middleware can
/// delegate with `inner.handle(exchange).await`.
pub type ArcHandler = Arc<dyn Handler>;

/// The default terminal handler middleware wraps: responds 404 to anything.
pub(crate) async fn not_found(exchange: Exchange) -> Result<(), HandlerError> {
    exchange.response.set_status(StatusCode::NOT_FOUND);
    Ok(())
}
