//! docgate library
//!
//! Configuration, process wiring and the HTTP server around the
//! `docgate-pipeline` dispatcher. Exposed for the binary and integration
//! tests.

pub mod app_context;
pub mod cli;
pub mod config;
pub mod server;

pub use app_context::AppContext;
pub use config::{ConfigError, GatewayConfig};
