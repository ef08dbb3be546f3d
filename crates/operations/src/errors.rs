use docgate_core_types::DocIdType;
use docgate_errors::prelude::*;
use docgate_storage::StorageError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::taxonomy;

#[derive(Debug, Error)]
#[error("{0:?}")]
pub struct OperationError(pub ErrorObj);

impl OperationError {
    pub fn into_inner(self) -> ErrorObj {
        self.0
    }

    pub fn status(&self) -> u16 {
        self.0.http_status
    }

    pub fn etag_required() -> Self {
        OperationError(ErrorBuilder::new(codes::ETAG_REQUIRED).build())
    }

    pub fn etag_mismatch(current: Option<&str>) -> Self {
        let mut builder = ErrorBuilder::new(codes::ETAG_MISMATCH);
        if let Some(etag) = current {
            builder = builder.meta_kv("etag", json!(etag));
        }
        OperationError(builder.build())
    }

    pub fn not_found(msg: &str) -> Self {
        OperationError(
            ErrorBuilder::new(codes::STORAGE_NOT_FOUND)
                .dev_msg(msg)
                .build(),
        )
    }

    pub fn conflict(msg: &str) -> Self {
        OperationError(
            ErrorBuilder::new(codes::STORAGE_CONFLICT)
                .user_msg(msg)
                .build(),
        )
    }

    pub fn reserved_id(id: &str) -> Self {
        OperationError(
            ErrorBuilder::new(codes::ID_RESERVED)
                .user_msg(format!("id is reserved: {id}"))
                .build(),
        )
    }

    pub fn id_type_mismatch(id: &Value, id_type: DocIdType) -> Self {
        OperationError(
            ErrorBuilder::new(codes::ID_TYPE_MISMATCH)
                .user_msg(format!("_id {id} is not valid for id type {id_type}"))
                .build(),
        )
    }

    pub fn missing_id(id_type: DocIdType) -> Self {
        OperationError(
            ErrorBuilder::new(codes::ID_TYPE_MISMATCH)
                .user_msg(format!(
                    "_id in content body is mandatory for documents with id type {id_type}"
                ))
                .build(),
        )
    }

    pub fn malformed_query(msg: impl Into<String>) -> Self {
        OperationError(
            ErrorBuilder::new(codes::REQUEST_MALFORMED_QUERY)
                .user_msg(msg)
                .build(),
        )
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        OperationError(
            ErrorBuilder::new(codes::REQUEST_INVALID_BODY)
                .user_msg(msg)
                .build(),
        )
    }

    /// Store-native failure with the status and message from the code table.
    pub fn native(code: i32, message: &str) -> Self {
        OperationError(
            ErrorBuilder::new(codes::STORAGE_NATIVE)
                .http_status(taxonomy::status_for(code))
                .user_msg(taxonomy::message_for(code, message))
                .dev_msg(message)
                .meta_kv("native_code", json!(code))
                .build(),
        )
    }

    pub fn internal(msg: &str) -> Self {
        OperationError(
            ErrorBuilder::new(codes::UNKNOWN_INTERNAL)
                .dev_msg(msg)
                .build(),
        )
    }
}

impl From<ErrorObj> for OperationError {
    fn from(value: ErrorObj) -> Self {
        OperationError(value)
    }
}

/// Native store errors are re-mapped through the code table; everything else
/// keeps its registered status.
impl From<StorageError> for OperationError {
    fn from(err: StorageError) -> Self {
        let obj = err.into_inner();
        match obj.native_code().and_then(|c| i32::try_from(c).ok()) {
            Some(code) => {
                OperationError::native(code, obj.message_dev.as_deref().unwrap_or_default())
            }
            None => OperationError(obj),
        }
    }
}
