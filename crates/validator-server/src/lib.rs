//! Validator Server: routes authenticated requests to the services.
//!
//! The server owns all services and provides the `RequestHandler`
//! implementation for the transport layer. `config` turns raw launch
//! options into the validated configuration every component is built from.

pub mod config;
pub mod router;

pub use config::{ConfigError, LaunchSettings, ServerConfig};
pub use router::ValidatorServer;
