//! The in-process transport bridge.
//!
//! # Responsibilities
//! - Convert an outgoing request into a synthetic inbound exchange
//! - Run the handler on a background task, never on the caller's poll path
//! - Await the response head and hand the caller a streaming response
//! - Follow eligible redirects, rewriting method and headers per hop
//! - Attach and capture cookies when enabled
//!
//! # Design Decisions
//! - The request body is buffered once and replayed on every hop
//! - An owned `Parts` value is threaded through the redirect loop; each hop
//!   records the effective request on the response as an extension
//! - Redirect-limit exhaustion is a well-formed 500 problem response, not an
//!   error, so it is observable like any other HTTP outcome

pub mod cancel;
mod channel;
pub mod exchange;
pub mod handler;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use futures_util::future::BoxFuture;
use thiserror::Error;
use tower::Service;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::cookies::CookieJar;
use crate::problem::{self, ProblemDetails};
use crate::redirect::{self, RedirectDecision};

use cancel::Cancellation;
use channel::ResponseChannel;
pub use channel::ResponseHead;
use handler::{ArcHandler, Handler};

/// Errors surfaced by an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request was canceled before the handler produced a response.
    #[error("request was canceled")]
    Canceled,
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(String),
    /// The handler task went away without resolving the response.
    #[error("response channel closed before a response was produced")]
    ChannelClosed,
    /// The transport was closed before the request was sent.
    #[error("transport has been closed")]
    Closed,
    /// The outgoing request body could not be buffered.
    #[error("failed to buffer request body: {0}")]
    Body(String),
}

/// Rejections from [`LoopbackTransport::use_cookies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CookieUsageError {
    /// The first exchange has already begun.
    #[error("it is not permitted to change cookie usage after the initial operation")]
    AfterInitialOperation,
    /// The transport has been closed.
    #[error("it is not permitted to change cookie usage after the transport has been closed")]
    AfterClose,
}

/// Method, URI and headers of the outgoing request that produced a response
/// hop. Attached to every response as an extension so callers can inspect
/// the redirect chain's final effective request.
#[derive(Debug, Clone)]
pub struct EffectiveRequest {
    /// Method the hop was issued with.
    pub method: Method,
    /// Absolute URI the hop was issued against.
    pub uri: Uri,
    /// Headers the hop was issued with, including synthesized entries.
    pub headers: HeaderMap,
}

struct TransportInner {
    application: ArcHandler,
    cookies: CookieJar,
    use_cookies: AtomicBool,
    allow_auto_redirect: AtomicBool,
    auto_redirect_limit: AtomicUsize,
    operation_started: AtomicBool,
    closed: AtomicBool,
}

/// In-process HTTP transport: sends requests to a local handler task instead
/// of a socket. Cheap to clone; clones share the cookie jar and settings.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<TransportInner>,
}

impl LoopbackTransport {
    /// Create a transport from a raw handler.
    pub fn new(application: impl Handler) -> Self {
        Self::with_config(application, TransportConfig::default())
    }

    /// Create a transport from a handler and initial settings.
    pub fn with_config(application: impl Handler, config: TransportConfig) -> Self {
        Self {
            inner: Arc::new(TransportInner {
                application: Arc::new(application),
                cookies: CookieJar::new(),
                use_cookies: AtomicBool::new(config.use_cookies),
                allow_auto_redirect: AtomicBool::new(config.allow_auto_redirect),
                auto_redirect_limit: AtomicUsize::new(config.auto_redirect_limit),
                operation_started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a transport from a middleware function. The middleware wraps a
    /// default terminal handler that responds 404 to everything.
    pub fn from_middleware<M, H>(middleware: M) -> Self
    where
        M: FnOnce(ArcHandler) -> H,
        H: Handler,
    {
        let terminal: ArcHandler = Arc::new(handler::not_found);
        Self::new(middleware(terminal))
    }

    /// Enable or disable cookie persistence. Cookie policy is fixable only
    /// before the first exchange and only while the transport is live; on
    /// rejection the existing setting is unchanged.
    pub fn use_cookies(&self, enabled: bool) -> Result<(), CookieUsageError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CookieUsageError::AfterClose);
        }
        if self.inner.operation_started.load(Ordering::SeqCst) {
            return Err(CookieUsageError::AfterInitialOperation);
        }
        self.inner.use_cookies.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    /// Enable or disable automatic redirect following.
    pub fn set_allow_auto_redirect(&self, allow: bool) {
        self.inner.allow_auto_redirect.store(allow, Ordering::SeqCst);
    }

    /// Set the maximum number of redirect hops per request.
    pub fn set_auto_redirect_limit(&self, limit: usize) {
        self.inner.auto_redirect_limit.store(limit, Ordering::SeqCst);
    }

    /// The cookie jar accumulated across exchanges.
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.inner.cookies
    }

    /// Tear the transport down. Subsequent sends fail with
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Send a request through the handler, following redirects when enabled.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        self.send_with_cancellation(request, &Cancellation::new())
            .await
    }

    /// Send a request with a cancellation signal covering every hop.
    pub async fn send_with_cancellation(
        &self,
        request: Request<Body>,
        cancellation: &Cancellation,
    ) -> Result<Response<Body>, TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.operation_started.store(true, Ordering::SeqCst);

        let (mut parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        let mut response = self.send_core(&mut parts, body.clone(), cancellation).await?;
        let mut redirects = 0usize;

        loop {
            if !self.inner.allow_auto_redirect.load(Ordering::SeqCst) {
                break;
            }
            let RedirectDecision::Follow { method } =
                redirect::evaluate(response.status(), &parts.method)
            else {
                break;
            };

            let limit = self.inner.auto_redirect_limit.load(Ordering::SeqCst);
            if redirects >= limit {
                tracing::warn!(limit, uri = %parts.uri, "redirect limit reached");
                return Ok(too_many_redirects_response(limit, &response));
            }

            let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                tracing::warn!(status = %response.status(), uri = %parts.uri,
                    "redirect response without a Location header");
                break;
            };
            let Some(next) = redirect::resolve_location(&parts.uri, location) else {
                tracing::warn!(location, uri = %parts.uri, "unresolvable Location header");
                break;
            };

            tracing::debug!(from = %parts.uri, to = %next, method = %method, "following redirect");
            parts.uri = next;
            parts.method = method;
            redirect::strip_sensitive_headers(&mut parts.headers);

            response = self.send_core(&mut parts, body.clone(), cancellation).await?;
            redirects += 1;
        }

        Ok(response)
    }

    /// One hop: cookie attach, exchange build, handler spawn, response await,
    /// cookie capture.
    async fn send_core(
        &self,
        parts: &mut Parts,
        body: Bytes,
        cancellation: &Cancellation,
    ) -> Result<Response<Body>, TransportError> {
        let exchange_id = Uuid::new_v4();

        if self.inner.use_cookies.load(Ordering::SeqCst) {
            if let Some(value) = self.inner.cookies.cookie_header_for(&parts.uri) {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    // Additive: manually-set cookie headers are preserved.
                    parts.headers.append(header::COOKIE, value);
                }
            }
        }

        let (exchange, channel, response_future) = exchange::build(parts, body);
        tracing::debug!(
            exchange_id = %exchange_id,
            method = %parts.method,
            uri = %parts.uri,
            "dispatching exchange"
        );

        let application = Arc::clone(&self.inner.application);
        let cancel_rx = cancellation.subscribe();
        tokio::spawn(run_exchange(application, exchange, channel, cancel_rx));

        let mut response = response_future
            .await
            .map_err(|_| TransportError::ChannelClosed)??;

        if self.inner.use_cookies.load(Ordering::SeqCst) {
            let set_cookies: Vec<String> = response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok().map(str::to_owned))
                .collect();
            if !set_cookies.is_empty() {
                self.inner.cookies.store(&parts.uri, set_cookies);
            }
        }

        tracing::debug!(exchange_id = %exchange_id, status = %response.status(), "exchange resolved");
        response.extensions_mut().insert(EffectiveRequest {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        });
        Ok(response)
    }
}

/// The background task for one hop. Handler outcomes are intercepted here
/// and turned into channel resolutions; a cancellation drops the handler's
/// future and aborts the channel.
async fn run_exchange(
    application: ArcHandler,
    exchange: exchange::Exchange,
    channel: ResponseChannel,
    cancel_rx: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = cancel::cancelled(cancel_rx) => {
            channel.abort(TransportError::Canceled);
        }
        result = application.handle(exchange) => match result {
            Ok(()) => channel.complete(),
            Err(error) => channel.abort(TransportError::Handler(error.to_string())),
        },
    }
}

/// The terminal diagnostic for redirect-limit exhaustion: a well-formed 500
/// carrying an RFC 7807 payload, returned through the normal response path.
fn too_many_redirects_response(limit: usize, last: &Response<Body>) -> Response<Body> {
    let payload = serde_json::to_vec(&ProblemDetails::too_many_redirects(limit))
        .expect("problem payload serializes");
    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(problem::MEDIA_TYPE),
    );
    if let Some(effective) = last.extensions().get::<EffectiveRequest>() {
        response.extensions_mut().insert(effective.clone());
    }
    response
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("use_cookies", &self.inner.use_cookies.load(Ordering::SeqCst))
            .field(
                "allow_auto_redirect",
                &self.inner.allow_auto_redirect.load(Ordering::SeqCst),
            )
            .field(
                "auto_redirect_limit",
                &self.inner.auto_redirect_limit.load(Ordering::SeqCst),
            )
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Service<Request<Body>> for LoopbackTransport {
    type Response = Response<Body>;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<Response<Body>, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Poll::Ready(Err(TransportError::Closed))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.send(request).await })
    }
}
