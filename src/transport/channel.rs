//! Response channel: the rendezvous point between a running handler and the
//! caller awaiting a response.
//!
//! # Responsibilities
//! - Buffer response body bytes without ever blocking the producer
//! - Freeze the response head and resolve the caller's future on first write
//! - Resolve with an empty body when the handler finishes without writing
//! - Propagate aborts to both the pending future and the body stream
//!
//! # Design Decisions
//! - The future resolves at most once; first of write/complete/abort wins
//! - Abort still poisons the body stream after the head has resolved, so a
//!   reader that already holds the response observes the failure
//! - All transitions happen under one mutex to rule out resolution races

use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Response, StatusCode, Version};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::TransportError;

/// The mutable response head: status code and headers.
///
/// Handlers mutate it through [`ResponseWriter`](super::exchange::ResponseWriter)
/// until the first body write freezes it.
#[derive(Debug)]
pub struct ResponseHead {
    /// Response status code. Defaults to 200.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

/// Callback run against the head just before it freezes.
pub(crate) type OnHeaders = Box<dyn FnOnce(&mut ResponseHead) + Send + 'static>;

type BodyChunk = Result<Bytes, TransportError>;
type ResponseResult = Result<Response<Body>, TransportError>;

/// The caller's half: resolves once the head is final.
pub(crate) type ResponseFuture = oneshot::Receiver<ResponseResult>;

struct ChannelInner {
    /// `Some` until the head freezes.
    pending: Option<PendingHead>,
    head_tx: Option<oneshot::Sender<ResponseResult>>,
    /// `Some` until the channel is completed or aborted.
    body_tx: Option<mpsc::UnboundedSender<BodyChunk>>,
    /// Held back until the head freezes, then wrapped into the response body.
    body_rx: Option<mpsc::UnboundedReceiver<BodyChunk>>,
    error: Option<TransportError>,
    version: Version,
}

struct PendingHead {
    head: ResponseHead,
    callbacks: Vec<OnHeaders>,
}

/// Single-producer/single-consumer handoff between the handler task and the
/// awaiting caller. Cheap to clone; all clones share one state machine.
#[derive(Clone)]
pub(crate) struct ResponseChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

impl ResponseChannel {
    pub(crate) fn new(version: Version) -> (Self, ResponseFuture) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let channel = Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                pending: Some(PendingHead {
                    head: ResponseHead {
                        status: StatusCode::OK,
                        headers: HeaderMap::new(),
                    },
                    callbacks: Vec::new(),
                }),
                head_tx: Some(head_tx),
                body_tx: Some(body_tx),
                body_rx: Some(body_rx),
                error: None,
                version,
            })),
        };
        (channel, head_rx)
    }

    /// Mutate the head through `f`. Returns `None` once the head has frozen,
    /// in which case `f` is not run.
    pub(crate) fn with_head<R>(&self, f: impl FnOnce(&mut ResponseHead) -> R) -> Option<R> {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        inner.pending.as_mut().map(|pending| f(&mut pending.head))
    }

    /// Queue a callback to run just before the head freezes. Dropped if the
    /// head is already frozen.
    pub(crate) fn push_callback(&self, callback: OnHeaders) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if let Some(pending) = inner.pending.as_mut() {
            pending.callbacks.push(callback);
        }
    }

    /// Append body bytes. The first call freezes the head and resolves the
    /// response future; the bytes themselves become part of the body stream.
    pub(crate) fn write(&self, bytes: Bytes) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if let Some(error) = &inner.error {
            return Err(error.clone());
        }
        let Some(body_tx) = inner.body_tx.clone() else {
            return Err(TransportError::ChannelClosed);
        };
        Self::freeze_head(&mut inner);
        // A dropped reader just discards the bytes, like an unread buffer.
        let _ = body_tx.send(Ok(bytes));
        Ok(())
    }

    /// Normal completion: freeze the head if the handler never wrote, then
    /// close the body stream so reads terminate.
    pub(crate) fn complete(&self) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if inner.error.is_some() {
            return;
        }
        Self::freeze_head(&mut inner);
        inner.body_tx = None;
    }

    /// Failure: reject the future if it is still pending and poison the body
    /// stream. The first abort wins; later aborts are no-ops.
    pub(crate) fn abort(&self, error: TransportError) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if inner.error.is_some() {
            return;
        }
        if let Some(head_tx) = inner.head_tx.take() {
            let _ = head_tx.send(Err(error.clone()));
            inner.pending = None;
            inner.body_rx = None;
        }
        if let Some(body_tx) = inner.body_tx.take() {
            let _ = body_tx.send(Err(error.clone()));
        }
        inner.error = Some(error);
    }

    /// Snapshot the head into a response and resolve the future. No-op once
    /// the head has already frozen.
    fn freeze_head(inner: &mut ChannelInner) {
        let Some(mut pending) = inner.pending.take() else {
            return;
        };
        for callback in pending.callbacks.drain(..) {
            callback(&mut pending.head);
        }
        let body = match inner.body_rx.take() {
            Some(body_rx) => Body::from_stream(UnboundedReceiverStream::new(body_rx)),
            None => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = pending.head.status;
        *response.headers_mut() = pending.head.headers;
        *response.version_mut() = inner.version;
        if let Some(head_tx) = inner.head_tx.take() {
            let _ = head_tx.send(Ok(response));
        }
    }
}
