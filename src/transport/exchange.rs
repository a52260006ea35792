//! Per-hop exchange state.
//!
//! # Responsibilities
//! - Build the synthetic inbound request view from the outgoing request
//! - Synthesize the `Host` and `Content-Length` headers
//! - Expose the writer half of the response channel to the handler
//!
//! # Design Decisions
//! - The exchange is exclusively owned by the handler's task; the response
//!   channel is the only synchronized handoff back to the caller
//! - The request body is materialized before the handler starts, so the
//!   handler may read it immediately and redirect hops can replay it

use std::borrow::Cow;

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};

use super::channel::{ResponseChannel, ResponseFuture, ResponseHead};
use super::TransportError;

/// One synthetic inbound request/response exchange, handed to the handler.
pub struct Exchange {
    /// The inbound view of the outgoing request.
    pub request: InboundRequest,
    /// The response side: status, headers and body sink.
    pub response: ResponseWriter,
}

/// The inbound view of an outgoing request, as a server-side handler sees it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl InboundRequest {
    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Effective request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI scheme, when the request URI is absolute.
    pub fn scheme(&self) -> Option<&str> {
        self.uri.scheme_str()
    }

    /// URI path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// URI query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Protocol version of the outgoing request.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers, including the synthesized `Host`, `Cookie` and
    /// `Content-Length` entries.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The materialized request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request body decoded as UTF-8, lossily.
    pub fn body_utf8(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// The handler's response surface. Status and headers are mutable until the
/// first body write freezes them; later mutations are not reflected.
pub struct ResponseWriter {
    channel: ResponseChannel,
}

impl ResponseWriter {
    pub(crate) fn new(channel: ResponseChannel) -> Self {
        Self { channel }
    }

    /// Set the response status code. No effect once the head has frozen.
    pub fn set_status(&self, status: StatusCode) {
        self.channel.with_head(|head| head.status = status);
    }

    /// Insert a response header, replacing any previous value.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.channel.with_head(move |head| {
            head.headers.insert(name, value);
        });
    }

    /// Append a response header, keeping previous values.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.channel.with_head(move |head| {
            head.headers.append(name, value);
        });
    }

    /// Queue a callback to run against the head just before it freezes, for
    /// headers that can only be produced late (e.g. cookies computed while
    /// the body is being written).
    pub fn on_headers(&self, callback: impl FnOnce(&mut ResponseHead) + Send + 'static) {
        self.channel.push_callback(Box::new(callback));
    }

    /// Append bytes to the response body. The first write freezes the head
    /// and releases the response to the caller; the write itself never
    /// blocks. Fails once the exchange has been aborted or completed.
    pub fn write(&self, bytes: impl Into<Bytes>) -> Result<(), TransportError> {
        self.channel.write(bytes.into())
    }
}

/// Build the exchange for one hop. Mutates `parts` in place so the
/// synthesized `Host` and `Content-Length` headers are also visible on the
/// effective request recorded for the hop.
pub(crate) fn build(parts: &mut Parts, body: Bytes) -> (Exchange, ResponseChannel, ResponseFuture) {
    set_host_header(parts);
    if !body.is_empty() && !parts.headers.contains_key(header::CONTENT_LENGTH) {
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    let (channel, response_future) = ResponseChannel::new(parts.version);
    let exchange = Exchange {
        request: InboundRequest {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            body,
        },
        response: ResponseWriter::new(channel.clone()),
    };
    (exchange, channel, response_future)
}

/// Overwrite `Host` from the request URI: bare host on the scheme's default
/// port, `host:port` otherwise. Left untouched when the URI has no authority.
fn set_host_header(parts: &mut Parts) {
    let Some(authority) = parts.uri.authority() else {
        return;
    };
    let host = match (parts.uri.scheme_str(), authority.port_u16()) {
        (_, None) | (Some("http"), Some(80)) | (Some("https"), Some(443)) => {
            authority.host().to_string()
        }
        (_, Some(port)) => format!("{}:{}", authority.host(), port),
    };
    if let Ok(value) = HeaderValue::from_str(&host) {
        parts.headers.insert(header::HOST, value);
    }
}
