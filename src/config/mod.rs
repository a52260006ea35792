//! Transport configuration.
//!
//! Initial settings for a transport. Serde-derived so embedders can load
//! them from whatever configuration source they already use.
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

use serde::{Deserialize, Serialize};

/// Default maximum number of redirect hops per request.
pub const DEFAULT_AUTO_REDIRECT_LIMIT: usize = 20;

/// Initial settings for a [`LoopbackTransport`](crate::LoopbackTransport).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Follow eligible redirects automatically.
    pub allow_auto_redirect: bool,

    /// Maximum number of redirect hops per logical request.
    pub auto_redirect_limit: usize,

    /// Attach and capture cookies across exchanges.
    pub use_cookies: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            allow_auto_redirect: false,
            auto_redirect_limit: DEFAULT_AUTO_REDIRECT_LIMIT,
            use_cookies: false,
        }
    }
}

/// Error type for configuration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// The redirect limit would forbid every hop.
    ZeroRedirectLimit,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::ZeroRedirectLimit => {
                write!(f, "auto_redirect_limit must be at least 1")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl TransportConfig {
    /// Semantic validation; serde handles the syntactic part.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.auto_redirect_limit == 0 {
            return Err(ValidationError::ZeroRedirectLimit);
        }
        Ok(())
    }
}
