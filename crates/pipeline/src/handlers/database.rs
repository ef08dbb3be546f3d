use docgate_storage::{etag_of, props, Mutation};
use serde_json::Value;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::handlers::{apply_result, conditions, db_name, public_properties, take_content};

/// Properties plus the collection names.
pub async fn get(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let db = db_name(ex)?;
    let (colls, properties) = match load(ctx, &db).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            ex.set_error(PipelineError::not_found("database does not exist"));
            return Ok(());
        }
        Err(err) => {
            ex.set_error(err);
            return Ok(());
        }
    };

    ex.etag = properties.as_ref().and_then(etag_of);
    let mut body = public_properties(properties);
    body.insert("_id".into(), Value::String(db));
    if let Some(etag) = &ex.etag {
        body.insert("_etag".into(), Value::String(etag.clone()));
    }
    let colls: Vec<Value> = colls
        .into_iter()
        .filter(|c| c != props::COLLECTION)
        .map(Value::String)
        .collect();
    body.insert("collections".into(), Value::Array(colls));
    ex.set_status(200);
    ex.set_body(Value::Object(body));
    Ok(())
}

async fn load(
    ctx: &GatewayContext,
    db: &str,
) -> Result<Option<(Vec<String>, Option<Value>)>, PipelineError> {
    if !ctx.store.list_databases().await?.iter().any(|d| d == db) {
        return Ok(None);
    }
    let colls = ctx.store.list_collections(db).await?;
    let props = ctx.controller.database_properties(db).await?;
    Ok(Some((colls, props)))
}

/// PUT replaces the properties, PATCH merges them. Both create the database.
pub async fn write(ctx: &GatewayContext, ex: &mut Exchange, merge: bool) -> Result<(), PipelineError> {
    let db = db_name(ex)?;
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
        .write_database_properties(&db, &conditions(ex), mutation)
        .await;
    apply_result(ex, result);
    Ok(())
}

pub async fn drop(ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
    let db = db_name(ex)?;
    let result = ctx.controller.drop_database(&db, &conditions(ex)).await;
    apply_result(ex, result);
    Ok(())
}
