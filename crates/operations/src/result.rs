use docgate_errors::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::OperationError;

/// Outcome of a single-resource write, delete or read.
#[derive(Clone, Debug, Default)]
pub struct OperationResult {
    pub http_code: u16,
    pub etag: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    /// Always `new_data._id`; set by the builder.
    pub new_id: Option<Value>,
    pub cause: Option<ErrorObj>,
}

impl OperationResult {
    pub fn builder(http_code: u16) -> OperationResultBuilder {
        OperationResultBuilder {
            inner: OperationResult {
                http_code,
                ..OperationResult::default()
            },
        }
    }

    pub fn failed(err: OperationError) -> Self {
        OperationResult::builder(err.status()).cause(err).build()
    }

    pub fn is_error(&self) -> bool {
        self.cause.is_some() || self.http_code >= 400
    }
}

pub struct OperationResultBuilder {
    inner: OperationResult,
}

impl OperationResultBuilder {
    pub fn etag(mut self, etag: Option<String>) -> Self {
        self.inner.etag = etag;
        self
    }

    pub fn old_data(mut self, data: Value) -> Self {
        self.inner.old_data = Some(data);
        self
    }

    pub fn new_data(mut self, data: Value) -> Self {
        self.inner.new_data = Some(data);
        self
    }

    pub fn cause(mut self, err: OperationError) -> Self {
        self.inner.cause = Some(err.into_inner());
        self
    }

    pub fn build(mut self) -> OperationResult {
        self.inner.new_id = self
            .inner
            .new_data
            .as_ref()
            .and_then(|d| d.get("_id"))
            .cloned();
        self.inner
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BulkItemError {
    pub index: usize,
    #[serde(rename = "httpStatus")]
    pub http_status: u16,
    #[serde(rename = "mongodbErrorCode", skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i32>,
    pub message: String,
}

/// Aggregated answer to one bulk request. Counters stay zero unless the store
/// acknowledged the write.
#[derive(Clone, Debug, Default)]
pub struct BulkOperationResult {
    pub http_code: u16,
    pub etag: Option<String>,
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    pub links: Vec<String>,
    pub errors: Vec<BulkItemError>,
    /// Set when the request was rejected before reaching the store.
    pub cause: Option<ErrorObj>,
}

impl BulkOperationResult {
    pub fn rejected(err: OperationError) -> Self {
        BulkOperationResult {
            http_code: err.status(),
            cause: Some(err.into_inner()),
            ..BulkOperationResult::default()
        }
    }

    pub fn representation(&self) -> Value {
        json!({
            "inserted": self.inserted,
            "deleted": self.deleted,
            "modified": self.modified,
            "matched": self.matched,
            "links": self.links,
            "errors": self.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_follows_new_data() {
        let result = OperationResult::builder(201)
            .new_data(json!({"_id": "a", "n": 1}))
            .build();
        assert_eq!(result.new_id, Some(json!("a")));

        let result = OperationResult::builder(204).old_data(json!({"_id": "a"})).build();
        assert_eq!(result.new_id, None);
    }

    #[test]
    fn failed_result_carries_status_and_cause() {
        let result = OperationResult::failed(OperationError::etag_required());
        assert_eq!(result.http_code, 409);
        assert!(result.is_error());
        assert_eq!(result.cause.unwrap().code, codes::ETAG_REQUIRED);
    }

    #[test]
    fn empty_bulk_representation() {
        let rep = BulkOperationResult::default().representation();
        assert_eq!(
            rep,
            json!({"inserted": 0, "deleted": 0, "modified": 0, "matched": 0, "links": [], "errors": []})
        );
    }
}
