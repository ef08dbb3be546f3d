use std::sync::Arc;

use async_trait::async_trait;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::handlers::Operation;
use crate::stages::Stage;

/// Runs the operation handler selected for the chain.
pub struct OperationStage {
    pub ctx: Arc<GatewayContext>,
    pub operation: Operation,
}

#[async_trait]
impl Stage for OperationStage {
    fn name(&self) -> &'static str {
        "operation"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        self.operation.run(&self.ctx, ex).await
    }
}
