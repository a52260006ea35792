//! Redirect-following policy.
//!
//! # Responsibilities
//! - Classify a hop response against the redirect rules
//! - Decide the next hop's method (301/302/303 rewrite to GET)
//! - Resolve `Location` values against the URI that produced them
//! - Strip credentials before a hop to a new location
//!
//! # Design Decisions
//! - 307 preserves the method, but only for body-less methods; a 307 on a
//!   body-bearing method is terminal and returned unchanged
//! - Pure functions over status and method, no transport state

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use url::Url;

/// Outcome of classifying a hop response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Follow the redirect, issuing the next hop with this method.
    Follow {
        /// Method for the next hop.
        method: Method,
    },
    /// The response is terminal; return it to the caller.
    Stay,
}

/// Classify a hop response given the method the hop was issued with.
pub fn evaluate(status: StatusCode, method: &Method) -> RedirectDecision {
    if redirects_to_get(status) {
        return RedirectDecision::Follow {
            method: Method::GET,
        };
    }
    if status == StatusCode::TEMPORARY_REDIRECT && is_bodyless(method) {
        return RedirectDecision::Follow {
            method: method.clone(),
        };
    }
    RedirectDecision::Stay
}

/// 301, 302 and 303 all rewrite the next hop to GET.
fn redirects_to_get(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303)
}

/// Methods that carry no request body.
pub fn is_bodyless(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

/// Resolve a `Location` header value against the URI that produced it.
/// Relative references resolve against the base; absolute ones replace it.
/// `None` when the value cannot be resolved.
pub fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    let base = Url::parse(&base.to_string()).ok()?;
    let resolved = base.join(location).ok()?;
    resolved.as_str().parse().ok()
}

/// Remove headers that must not leak to a redirect target.
pub fn strip_sensitive_headers(headers: &mut HeaderMap) {
    headers.remove(header::AUTHORIZATION);
}
