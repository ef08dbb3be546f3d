use serde_json::Value;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;

pub async fn list_databases(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    match ctx.store.list_databases().await {
        Ok(names) => {
            ex.set_status(200);
            ex.set_body(Value::from(names));
        }
        Err(err) => ex.set_error(PipelineError::from(err)),
    }
    Ok(())
}
