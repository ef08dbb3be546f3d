pub use crate::context::{GatewayContext, PipelineSettings};
pub use crate::dispatcher::Dispatcher;
pub use crate::errors::PipelineError;
pub use crate::exchange::{Exchange, GatewayRequest, GatewayResponse, ParsedQuery};
pub use crate::handlers::Operation;
pub use crate::realm::{basic_header, Authenticator, FileRealm, UserSpec};
pub use crate::stages::{PipelinedChain, Stage};
