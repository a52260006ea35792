//! In-Process HTTP Transport Bridge Library

pub mod config;
pub mod cookies;
pub mod problem;
pub mod redirect;
pub mod transport;

pub use config::TransportConfig;
pub use cookies::{Cookie, CookieJar};
pub use problem::ProblemDetails;
pub use transport::cancel::Cancellation;
pub use transport::exchange::{Exchange, InboundRequest, ResponseWriter};
pub use transport::handler::{ArcHandler, Handler, HandlerError};
pub use transport::{
    CookieUsageError, EffectiveRequest, LoopbackTransport, ResponseHead, TransportError,
};
