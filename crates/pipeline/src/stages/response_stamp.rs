use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

pub struct ResponseStampStage;

#[async_trait]
impl Stage for ResponseStampStage {
    fn name(&self) -> &'static str {
        "response-stamp"
    }

    fn observes_errors(&self) -> bool {
        true
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let request_id = ex.request_id.clone();
        ex.set_header("X-Request-Id", &request_id);
        if let Some(err) = ex.error() {
            let (status, body) = (err.http_status, err.to_http_body());
            ex.set_status(status);
            ex.set_body(body);
        }
        if let Some(etag) = ex.etag.clone() {
            ex.set_header("ETag", &etag);
        }
        Ok(())
    }
}
