use docgate_storage::Mutation;
use serde_json::Value;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::handlers::{apply_result, conditions, namespace, take_content};

fn document_id(ex: &Exchange) -> Result<Value, PipelineError> {
    match ex.document_id() {
        Some(id) => Ok(id?),
        None => Err(PipelineError::internal("resource path has no document")),
    }
}

/// The document and its `ETag`; 304 when `If-None-Match` already has it.
pub async fn get(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let id = match document_id(ex) {
        Ok(id) => id,
        Err(err) => {
            ex.set_error(err);
            return Ok(());
        }
    };
    match ctx.controller.read(&ns, &id, ex.read_filter.as_ref()).await {
        Ok(Some((doc, etag))) => {
            let unchanged = matches!((&etag, ex.if_none_match()), (Some(etag), Some(seen)) if etag == seen);
            ex.etag = etag;
            if unchanged {
                ex.set_status(304);
            } else {
                ex.set_status(200);
                ex.set_body(doc);
            }
        }
        Ok(None) => ex.set_error(PipelineError::not_found("document does not exist")),
        Err(err) => ex.set_error(PipelineError::from(err)),
    }
    Ok(())
}

/// PUT replaces (upsert), PATCH updates (upsert).
pub async fn write(ctx: &GatewayContext, ex: &mut Exchange, merge: bool) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let id = match document_id(ex) {
        Ok(id) => id,
        Err(err) => {
            ex.set_error(err);
            return Ok(());
        }
    };
    let mut content = take_content(ex);
    if let Some(map) = content.as_object_mut() {
        map.remove("_id");
    }
    let mutation = if merge {
        Mutation::Update(content)
    } else {
        Mutation::Replace(content)
    };
    let result = ctx
        .controller
        .write(&ns, &id, &conditions(ex), mutation)
        .await;
    apply_result(ex, result);
    Ok(())
}

pub async fn delete(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let id = match document_id(ex) {
        Ok(id) => id,
        Err(err) => {
            ex.set_error(err);
            return Ok(());
        }
    };
    let result = ctx.controller.delete(&ns, &id, &conditions(ex)).await;
    apply_result(ex, result);
    Ok(())
}
