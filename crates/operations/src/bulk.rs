//! Bulk writes: fail-fast pre-flight, one store call, then aggregation of
//! the native result into counters, links and per-item errors.

use std::sync::Arc;

use docgate_core_types::{id_to_path_segment, DocIdType, ObjectId};
use docgate_storage::prelude::*;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::errors::OperationError;
use crate::etag::and_filter;
use crate::result::{BulkItemError, BulkOperationResult};
use crate::taxonomy;

#[derive(Clone, Copy, Debug)]
pub struct BulkPolicy<'a> {
    pub id_type: DocIdType,
    pub reserved_ids: &'a [String],
    pub reserved_prefixes: &'a [String],
    pub write_filter: Option<&'a Value>,
}

impl BulkPolicy<'_> {
    pub fn is_reserved(&self, id: &str) -> bool {
        self.reserved_ids.iter().any(|r| r == id)
            || self.reserved_prefixes.iter().any(|p| id.starts_with(p.as_str()))
    }
}

/// Checks every item before anything is written; the first violation wins.
pub fn preflight(batch: &[Value], policy: &BulkPolicy<'_>) -> Result<(), OperationError> {
    for (index, item) in batch.iter().enumerate() {
        if !item.is_object() {
            return Err(OperationError::invalid_body(format!(
                "item {index} of the batch is not a document"
            )));
        }
        match item.get("_id") {
            Some(Value::String(id)) if policy.is_reserved(id) => {
                return Err(OperationError::reserved_id(id));
            }
            Some(id) if !policy.id_type.accepts(id) => {
                return Err(OperationError::id_type_mismatch(id, policy.id_type));
            }
            Some(_) => {}
            None if !policy.id_type.can_generate() => {
                return Err(OperationError::missing_id(policy.id_type));
            }
            None => {}
        }
    }
    Ok(())
}

/// `<collection path>/<id>`, qualified with `?id_type=` when the id would
/// not round-trip under the default policy.
pub fn document_link(collection_path: &str, id: &Value) -> Option<String> {
    let segment = id_to_path_segment(id)?;
    let base = collection_path.trim_end_matches('/');
    Some(match DocIdType::for_link(id) {
        DocIdType::StringOid => format!("{base}/{segment}"),
        other => format!("{base}/{segment}?id_type={other}"),
    })
}

#[derive(Clone)]
pub struct BulkAggregator {
    store: Arc<dyn DocumentStore>,
}

impl BulkAggregator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Bulk POST. Items carrying an `_id` upsert, the rest insert with a
    /// generated id. All of them share one fresh etag.
    pub async fn bulk_write(
        &self,
        ns: &Namespace,
        collection_path: &str,
        batch: Vec<Value>,
        policy: &BulkPolicy<'_>,
    ) -> BulkOperationResult {
        if let Err(err) = preflight(&batch, policy) {
            debug!(ns = %ns, status = err.status(), "bulk pre-flight rejected the batch");
            return BulkOperationResult::rejected(err);
        }
        let etag = ObjectId::new();
        let total = batch.len();
        let models: Vec<WriteModel> = batch
            .into_iter()
            .map(|item| {
                let mut doc = item;
                if let Some(map) = doc.as_object_mut() {
                    map.insert("_etag".into(), etag.to_json());
                }
                match doc.get("_id").cloned() {
                    Some(id) => WriteModel::ReplaceOne {
                        filter: and_filter(json!({ "_id": id }), policy.write_filter),
                        replacement: doc,
                        upsert: true,
                    },
                    None => {
                        if let Some(map) = doc.as_object_mut() {
                            map.insert("_id".into(), ObjectId::new().to_json());
                        }
                        WriteModel::InsertOne { document: doc }
                    }
                }
            })
            .collect();

        let native = match self.store.bulk_write(ns, models).await {
            Ok(native) => native,
            Err(err) => return BulkOperationResult::rejected(err.into()),
        };
        let mut result = aggregate(&native, collection_path);
        result.etag = Some(etag.to_hex());
        let written = result.inserted + result.modified + result.matched;
        result.http_code = overall_status(&result.errors, total, if written > 0 { 201 } else { 200 });
        debug!(
            ns = %ns,
            inserted = result.inserted,
            modified = result.modified,
            errors = result.errors.len(),
            "bulk write aggregated"
        );
        result
    }

    /// Bulk PATCH over every document matching `filter`.
    pub async fn bulk_update(
        &self,
        ns: &Namespace,
        filter: Option<&Value>,
        update: &Value,
        write_filter: Option<&Value>,
    ) -> BulkOperationResult {
        let Some(filter) = filter else {
            return BulkOperationResult::rejected(OperationError::malformed_query(
                "the filter query parameter is mandatory for bulk updates",
            ));
        };
        let etag = ObjectId::new();
        let update = with_etag(update, &etag);
        let models = vec![WriteModel::UpdateMany {
            filter: and_filter(filter.clone(), write_filter),
            update,
        }];
        let mut result = self.run(ns, models).await;
        if result.cause.is_none() {
            result.etag = Some(etag.to_hex());
        }
        result
    }

    /// Bulk DELETE over every document matching `filter`.
    pub async fn bulk_delete(
        &self,
        ns: &Namespace,
        filter: Option<&Value>,
        write_filter: Option<&Value>,
    ) -> BulkOperationResult {
        let Some(filter) = filter else {
            return BulkOperationResult::rejected(OperationError::malformed_query(
                "the filter query parameter is mandatory for bulk deletes",
            ));
        };
        let models = vec![WriteModel::DeleteMany {
            filter: and_filter(filter.clone(), write_filter),
        }];
        self.run(ns, models).await
    }

    async fn run(&self, ns: &Namespace, models: Vec<WriteModel>) -> BulkOperationResult {
        let total = models.len();
        match self.store.bulk_write(ns, models).await {
            Ok(native) => {
                let mut result = aggregate(&native, "");
                result.http_code = overall_status(&result.errors, total, 200);
                result
            }
            Err(err) => BulkOperationResult::rejected(err.into()),
        }
    }
}

/// Stamps `etag` into the update. Client operators never touch `_etag`.
fn with_etag(update: &Value, etag: &ObjectId) -> Value {
    let mut map = update.as_object().cloned().unwrap_or_default();
    if has_update_operators(&map) {
        for args in map.values_mut() {
            if let Some(args) = args.as_object_mut() {
                args.retain(|path, _| !is_etag_path(path));
            }
        }
        let set = map
            .entry("$set")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(set) = set.as_object_mut() {
            set.insert("_etag".into(), etag.to_json());
        }
        Value::Object(map)
    } else {
        map.retain(|path, _| !is_etag_path(path));
        map.insert("_etag".into(), etag.to_json());
        json!({ "$set": map })
    }
}

fn is_etag_path(path: &str) -> bool {
    path == "_etag" || path.starts_with("_etag.")
}

fn has_update_operators(map: &Map<String, Value>) -> bool {
    map.keys().any(|k| k.starts_with('$'))
}

fn aggregate(native: &NativeBulkResult, collection_path: &str) -> BulkOperationResult {
    let mut result = BulkOperationResult::default();
    if native.acknowledged {
        result.inserted = native.upserts.len() as u64 + native.inserted_count;
        result.matched = native.matched_count;
        result.modified = native.modified_count;
        result.deleted = native.deleted_count;

        let mut created: Vec<&BulkUpsert> =
            native.upserts.iter().chain(native.inserted_ids.iter()).collect();
        created.sort_by_key(|u| u.index);
        result.links = created
            .into_iter()
            .filter_map(|u| document_link(collection_path, &u.id))
            .collect();
    }
    result.errors = native
        .write_errors
        .iter()
        .map(|e| {
            if taxonomy::status_for(e.code) == 500 {
                warn!(index = e.index, native_code = e.code, message = %e.message, "unmapped native write error");
            }
            BulkItemError {
                index: e.index,
                http_status: taxonomy::status_for(e.code),
                native_code: Some(e.code),
                message: taxonomy::message_for(e.code, &e.message),
            }
        })
        .collect();
    result
}

/// First error status when every item failed, `success` otherwise.
fn overall_status(errors: &[BulkItemError], total: usize, success: u16) -> u16 {
    match errors.first() {
        Some(first) if errors.len() >= total => first.http_status,
        _ => success,
    }
}
