use std::time::Instant;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

pub struct RequestInitStage;

#[async_trait]
impl Stage for RequestInitStage {
    fn name(&self) -> &'static str {
        "request-init"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        ex.request_id = ex
            .header("X-Request-Id")
            .map(str::to_string)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        ex.started = Instant::now();
        Ok(())
    }
}
