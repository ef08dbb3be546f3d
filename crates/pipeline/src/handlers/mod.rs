//! Operation handlers: the step of each chain that talks to the store.

use docgate_core_types::{Method, ResourceType};
use docgate_operations::prelude::*;
use docgate_storage::Namespace;

use crate::context::GatewayContext;
use crate::errors::PipelineError;
use crate::exchange::Exchange;

pub mod bulk;
pub mod collection;
pub mod database;
pub mod document;
pub mod root;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListDatabases,
    GetDatabase,
    PutDatabase,
    PatchDatabase,
    DeleteDatabase,
    GetCollection,
    PutCollection,
    PatchCollection,
    PostCollection,
    DeleteCollection,
    GetDocument,
    PutDocument,
    PatchDocument,
    DeleteDocument,
    PatchBulk,
    DeleteBulk,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::ListDatabases,
        Operation::GetDatabase,
        Operation::PutDatabase,
        Operation::PatchDatabase,
        Operation::DeleteDatabase,
        Operation::GetCollection,
        Operation::PutCollection,
        Operation::PatchCollection,
        Operation::PostCollection,
        Operation::DeleteCollection,
        Operation::GetDocument,
        Operation::PutDocument,
        Operation::PatchDocument,
        Operation::DeleteDocument,
        Operation::PatchBulk,
        Operation::DeleteBulk,
    ];

    /// Resource type and method served by this operation.
    pub const fn route(self) -> (ResourceType, Method) {
        use Operation::*;
        match self {
            ListDatabases => (ResourceType::Root, Method::Get),
            GetDatabase => (ResourceType::Database, Method::Get),
            PutDatabase => (ResourceType::Database, Method::Put),
            PatchDatabase => (ResourceType::Database, Method::Patch),
            DeleteDatabase => (ResourceType::Database, Method::Delete),
            GetCollection => (ResourceType::Collection, Method::Get),
            PutCollection => (ResourceType::Collection, Method::Put),
            PatchCollection => (ResourceType::Collection, Method::Patch),
            PostCollection => (ResourceType::Collection, Method::Post),
            DeleteCollection => (ResourceType::Collection, Method::Delete),
            GetDocument => (ResourceType::Document, Method::Get),
            PutDocument => (ResourceType::Document, Method::Put),
            PatchDocument => (ResourceType::Document, Method::Patch),
            DeleteDocument => (ResourceType::Document, Method::Delete),
            PatchBulk => (ResourceType::BulkDocuments, Method::Patch),
            DeleteBulk => (ResourceType::BulkDocuments, Method::Delete),
        }
    }

    pub async fn run(self, ctx: &GatewayContext, ex: &mut Exchange) -> Result<(), PipelineError> {
        use Operation::*;
        match self {
            ListDatabases => root::list_databases(ctx, ex).await,
            GetDatabase => database::get(ctx, ex).await,
            PutDatabase => database::write(ctx, ex, false).await,
            PatchDatabase => database::write(ctx, ex, true).await,
            DeleteDatabase => database::drop(ctx, ex).await,
            GetCollection => collection::get(ctx, ex).await,
            PutCollection => collection::write_properties(ctx, ex, false).await,
            PatchCollection => collection::write_properties(ctx, ex, true).await,
            PostCollection => collection::post(ctx, ex).await,
            DeleteCollection => collection::drop(ctx, ex).await,
            GetDocument => document::get(ctx, ex).await,
            PutDocument => document::write(ctx, ex, false).await,
            PatchDocument => document::write(ctx, ex, true).await,
            DeleteDocument => document::delete(ctx, ex).await,
            PatchBulk => bulk::patch(ctx, ex).await,
            DeleteBulk => bulk::delete(ctx, ex).await,
        }
    }
}

/// Database name of a path that resolved to a db or deeper.
pub(crate) fn db_name(ex: &Exchange) -> Result<String, PipelineError> {
    ex.resource
        .db
        .clone()
        .ok_or_else(|| PipelineError::internal("resource path has no database"))
}

pub(crate) fn namespace(ex: &Exchange) -> Result<Namespace, PipelineError> {
    match (&ex.resource.db, &ex.resource.collection) {
        (Some(db), Some(coll)) => Ok(Namespace::new(db, coll)),
        _ => Err(PipelineError::internal("resource path has no collection")),
    }
}

pub(crate) fn conditions(ex: &Exchange) -> WriteConditions<'_> {
    WriteConditions {
        expected_etag: ex.if_match(),
        check_required: ex.etag_check_required,
        write_filter: ex.write_filter.as_ref(),
    }
}

/// Copies a single-resource result onto the exchange.
pub(crate) fn apply_result(ex: &mut Exchange, result: OperationResult) {
    ex.etag = result.etag;
    match result.cause {
        Some(cause) => ex.set_error(cause),
        None => ex.set_status(result.http_code),
    }
}

pub(crate) fn apply_bulk_result(ex: &mut Exchange, result: BulkOperationResult) {
    if let Some(cause) = result.cause {
        ex.set_error(cause);
        return;
    }
    ex.etag = result.etag.clone();
    ex.set_status(result.http_code);
    ex.set_body(result.representation());
}

/// Body of a write, or an empty document.
pub(crate) fn take_content(ex: &mut Exchange) -> serde_json::Value {
    ex.content
        .take()
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()))
}

/// Properties document without the storage bookkeeping fields.
pub(crate) fn public_properties(props: Option<serde_json::Value>) -> serde_json::Map<String, serde_json::Value> {
    let mut map = match props {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.remove("_id");
    map.remove("_etag");
    map
}
