//! RFC 7807 problem details.
//!
//! Machine-readable error payloads carried in HTTP responses, used by the
//! transport for the redirect-limit diagnostic.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Media type for problem responses.
pub const MEDIA_TYPE: &str = "application/problem+json; charset=utf-8";

/// An RFC 7807 problem payload. Serialized with camelCase field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProblemDetails {
    /// An absolute URI identifying the problem type; `about:blank` when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    pub detail: String,

    /// An absolute URI identifying this specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Default for ProblemDetails {
    fn default() -> Self {
        Self {
            r#type: None,
            title: String::new(),
            status: 500,
            detail: String::new(),
            instance: None,
        }
    }
}

/// Rejection for a `type` or `instance` value that is not an absolute URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("problem details `{field}` must be an absolute URI")]
pub struct NotAbsoluteUri {
    /// Name of the offending field.
    pub field: &'static str,
}

impl ProblemDetails {
    /// A problem with the given summary and explanation, status 500.
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// The redirect-limit diagnostic.
    pub fn too_many_redirects(limit: usize) -> Self {
        Self::new(
            "Too many redirects",
            format!("The number of redirects exceeded the maximum allowed number of {limit}"),
        )
    }

    /// Set the problem type URI. Must be absolute.
    pub fn with_type(mut self, uri: impl Into<String>) -> Result<Self, NotAbsoluteUri> {
        let uri = uri.into();
        if Url::parse(&uri).is_err() {
            return Err(NotAbsoluteUri { field: "type" });
        }
        self.r#type = Some(uri);
        Ok(self)
    }

    /// Set the problem instance URI. Must be absolute.
    pub fn with_instance(mut self, uri: impl Into<String>) -> Result<Self, NotAbsoluteUri> {
        let uri = uri.into();
        if Url::parse(&uri).is_err() {
            return Err(NotAbsoluteUri { field: "instance" });
        }
        self.instance = Some(uri);
        Ok(self)
    }
}
