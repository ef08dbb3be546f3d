use docgate_core_types::ObjectId;
use docgate_operations::prelude::*;
use docgate_storage::{etag_of, FindQuery, Mutation, Namespace};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::handlers::{apply_bulk_result, apply_result, conditions, namespace, take_content};

/// Filtered, sorted and paged documents. The read filter is ANDed in.
pub async fn get(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    match find(ctx, ex, &ns).await {
        Ok(Some((docs, etag))) => {
            ex.etag = etag;
            ex.set_status(200);
            ex.set_body(Value::Array(docs));
        }
        Ok(None) => ex.set_error(PipelineError::not_found("collection does not exist")),
        Err(err) => ex.set_error(err),
    }
    Ok(())
}

async fn find(
    ctx: &GatewayContext,
    ex: &Exchange,
    ns: &Namespace,
) -> Result<Option<(Vec<Value>, Option<String>)>, PipelineError> {
    let properties = ctx.controller.collection_properties(&ns.db, &ns.coll).await?;
    if properties.is_none() && !ctx.store.list_collections(&ns.db).await?.contains(&ns.coll) {
        return Ok(None);
    }
    let query = FindQuery {
        filter: and_filter(
            ex.parsed.filter.clone().unwrap_or_else(|| json!({})),
            ex.read_filter.as_ref(),
        ),
        sort: ex.parsed.sort.clone(),
        skip: ex.parsed.skip(),
        limit: Some(ex.parsed.pagesize),
        keys: ex.parsed.keys.clone(),
    };
    let docs = ctx.store.find(ns, &query).await?;
    debug!(ns = %ns, returned = docs.len(), "collection read");
    Ok(Some((docs, properties.as_ref().and_then(etag_of))))
}

/// PUT replaces the collection properties, PATCH merges them.
pub async fn write_properties(
    ctx: &GatewayContext,
    ex: &mut Exchange,
    merge: bool,
) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
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
        .write_collection_properties(&ns.db, &ns.coll, &conditions(ex), mutation)
        .await;
    apply_result(ex, result);
    Ok(())
}

/// One document, or a bulk insert for an array body.
pub async fn post(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let collection_path = ex.resource.collection_path();
    match take_content(ex) {
        Value::Array(batch) => {
            let result = {
                let policy = BulkPolicy {
                    id_type: ex.parsed.id_type,
                    reserved_ids: &ctx.settings.reserved_ids,
                    reserved_prefixes: &ctx.settings.reserved_id_prefixes,
                    write_filter: ex.write_filter.as_ref(),
                };
                ctx.bulk
                    .bulk_write(&ns, &collection_path, batch, &policy)
                    .await
            };
            apply_bulk_result(ex, result);
        }
        mut doc => {
            let id = match doc.get("_id").cloned() {
                Some(id) => id,
                None if ex.parsed.id_type.can_generate() => {
                    let id = ObjectId::new().to_json();
                    if let Some(map) = doc.as_object_mut() {
                        map.insert("_id".into(), id.clone());
                    }
                    id
                }
                None => {
                    ex.set_error(PipelineError::from(OperationError::missing_id(
                        ex.parsed.id_type,
                    )));
                    return Ok(());
                }
            };
            let result = ctx
                .controller
                .write(&ns, &id, &conditions(ex), Mutation::Insert(doc))
                .await;
            if !result.is_error() {
                if let Some(location) = document_link(&collection_path, &id) {
                    ex.set_header("Location", &location);
                }
            }
            apply_result(ex, result);
        }
    }
    Ok(())
}

pub async fn drop(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let ns = namespace(ex)?;
    let result = ctx
        .controller
        .drop_collection(&ns.db, &ns.coll, &conditions(ex))
        .await;
    apply_result(ex, result);
    Ok(())
}
