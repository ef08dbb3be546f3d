use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::errors::PipelineError;
use crate::exchange::Exchange;

/// One step of a request chain.
///
/// Expected failures are recorded with [`Exchange::set_error`] and the stage
/// returns `Ok`. An `Err` aborts the chain and becomes a logged 500.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stages that still run once the exchange is in error.
    fn observes_errors(&self) -> bool {
        false
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError>;
}

pub struct PipelinedChain {
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelinedChain {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn run(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        for stage in &self.stages {
            if ex.in_error() && !stage.observes_errors() {
                trace!(stage = stage.name(), "skipped, exchange in error");
                continue;
            }
            stage.handle(ex).await?;
        }
        Ok(())
    }
}

pub mod access_log;
pub mod authn;
pub mod authz;
pub mod content;
pub mod etag_policy;
pub mod not_implemented;
pub mod operation;
pub mod query;
pub mod request_init;
pub mod response_stamp;

pub use access_log::AccessLogStage;
pub use authn::AuthenticationStage;
pub use authz::AuthorizationStage;
pub use content::{ContentCheckStage, ContentInjectionStage};
pub use etag_policy::EtagPolicyStage;
pub use not_implemented::NotImplementedStage;
pub use operation::OperationStage;
pub use query::QueryParamsStage;
pub use request_init::RequestInitStage;
pub use response_stamp::ResponseStampStage;
