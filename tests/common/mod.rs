//! Shared fixtures for integration testing.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, Response, StatusCode};
use loopback_http::{EffectiveRequest, Exchange, HandlerError, LoopbackTransport};

/// Build a GET request with an empty body.
pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri, Body::empty())
}

/// Build a request.
pub fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap()
}

/// Read a response body to completion.
pub async fn read_body(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// The effective request recorded on a response hop.
pub fn effective(response: &Response<Body>) -> &EffectiveRequest {
    response
        .extensions()
        .get::<EffectiveRequest>()
        .expect("effective request extension")
}

/// A transport around [`redirect_fixture`] with auto-redirect enabled.
pub fn redirect_transport() -> LoopbackTransport {
    let transport = LoopbackTransport::new(redirect_fixture);
    transport.set_allow_auto_redirect(true);
    transport
}

/// Fixture handler exposing redirect endpoints:
///
/// - `/target` echoes the request body with status 200
/// - `/echo-cookie` echoes the request `Cookie` header value
/// - `/redirect-{301,302,303,307}-relative` redirects to `target`
/// - `/redirect-{301,302,303,307}-absolute` redirects to
///   `http://localhost/target`
/// - `/redirect-302-{absolute,relative}-setcookie` also sets `foo=bar`
/// - `/redirect-loop` redirects to itself
/// - anything else is a 404
pub async fn redirect_fixture(exchange: Exchange) -> Result<(), HandlerError> {
    let path = exchange.request.path().to_string();
    let response = &exchange.response;
    match path.as_str() {
        "/target" => {
            response.set_status(StatusCode::OK);
            response.write(exchange.request.body().clone())?;
        }
        "/echo-cookie" => {
            response.set_status(StatusCode::OK);
            let cookie = exchange
                .request
                .headers()
                .get(header::COOKIE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            response.write(cookie)?;
        }
        "/redirect-loop" => {
            response.set_status(StatusCode::FOUND);
            response.insert_header(header::LOCATION, HeaderValue::from_static("/redirect-loop"));
        }
        "/redirect-302-absolute-setcookie" => {
            response.set_status(StatusCode::FOUND);
            response.insert_header(
                header::LOCATION,
                HeaderValue::from_static("http://localhost/target"),
            );
            response.insert_header(header::SET_COOKIE, HeaderValue::from_static("foo=bar"));
        }
        "/redirect-302-relative-setcookie" => {
            response.set_status(StatusCode::FOUND);
            response.insert_header(header::LOCATION, HeaderValue::from_static("target"));
            response.insert_header(header::SET_COOKIE, HeaderValue::from_static("foo=bar"));
        }
        other => match parse_redirect_path(other) {
            Some((status, location)) => {
                response.set_status(status);
                response.insert_header(header::LOCATION, HeaderValue::from_str(&location)?);
            }
            None => response.set_status(StatusCode::NOT_FOUND),
        },
    }
    Ok(())
}

fn parse_redirect_path(path: &str) -> Option<(StatusCode, String)> {
    let rest = path.strip_prefix("/redirect-")?;
    let (code, kind) = rest.split_once('-')?;
    let status = StatusCode::from_u16(code.parse().ok()?).ok()?;
    match kind {
        "relative" => Some((status, "target".to_string())),
        "absolute" => Some((status, "http://localhost/target".to_string())),
        _ => None,
    }
}
