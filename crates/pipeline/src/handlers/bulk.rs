use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::handlers::{apply_bulk_result, namespace, take_content};

/// Update every document matching `filter`.
pub async fn patch(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let update = take_content(ex);
    let result = ctx
        .bulk
        .bulk_update(
            &ns,
            ex.parsed.filter.as_ref(),
            &update,
            ex.write_filter.as_ref(),
        )
        .await;
    apply_bulk_result(ex, result);
    Ok(())
}

/// Delete every document matching `filter`.
pub async fn delete(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let result = ctx
        .bulk
        .bulk_delete(&ns, ex.parsed.filter.as_ref(), ex.write_filter.as_ref())
        .await;
    apply_bulk_result(ex, result);
    Ok(())
}
