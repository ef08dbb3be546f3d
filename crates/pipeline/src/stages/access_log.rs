use async_trait::async_trait;
use tracing::info;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

/// One line per request.
pub struct AccessLogStage;

#[async_trait]
impl Stage for AccessLogStage {
    fn name(&self) -> &'static str {
        "access-log"
    }

    fn observes_errors(&self) -> bool {
        true
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        info!(
            request_id = %ex.request_id,
            method = %ex.method(),
            path = %ex.path(),
            status = ex.response.status,
            elapsed_ms = ex.started.elapsed().as_millis() as u64,
            user = ex.account_name().unwrap_or("-"),
            "request completed"
        );
        Ok(())
    }
}
