//! Request pipeline for docgate.
//!
//! Every request becomes an [`Exchange`] that flows through a
//! [`PipelinedChain`] chosen by the [`Dispatcher`] from the resource type and
//! method. Stages record expected failures on the exchange and keep going;
//! only the stages that observe errors still act once it is in error.

pub mod adapters;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod prelude;
pub mod realm;
pub mod stages;

pub use context::{GatewayContext, PipelineSettings};
pub use dispatcher::Dispatcher;
pub use errors::PipelineError;
pub use exchange::{Exchange, GatewayRequest, GatewayResponse, ParsedQuery};
pub use realm::{Authenticator, FileRealm, UserSpec};
pub use stages::{PipelinedChain, Stage};
