//! Validator API Transport Layer
//!
//! Provides the HTTP transport for the validator API. The transport layer handles:
//! - Session creation and origin pinning (`session`, `registry`)
//! - Authentication and dispatch of every inbound request (`dispatcher`)
//! - Listener lifecycle and graceful shutdown (`server`)
//!
//! The transport is decoupled from routing via the `RequestHandler` trait.

pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod session;

pub use axum::http::Method;
pub use dispatcher::AuthError;
pub use registry::SessionRegistry;
pub use server::{
    LifecycleState, RequestHandler, ShutdownHandle, TransportConfig, TransportError, TransportServer,
};
pub use session::{Session, SessionError};
