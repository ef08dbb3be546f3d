use docgate_errors::prelude::*;
use serde_json::json;
use thiserror::Error;

use crate::native::NativeError;

#[derive(Debug, Error)]
#[error("{0:?}")]
pub struct StorageError(pub Box<ErrorObj>);

impl StorageError {
    pub fn into_inner(self) -> ErrorObj {
        *self.0
    }

    pub fn native_code(&self) -> Option<i64> {
        self.0.native_code()
    }

    pub fn not_found(msg: &str) -> Self {
        StorageError(Box::new(
            ErrorBuilder::new(codes::STORAGE_NOT_FOUND)
                .dev_msg(msg)
                .build(),
        ))
    }

    pub fn conflict(msg: &str) -> Self {
        StorageError(Box::new(
            ErrorBuilder::new(codes::STORAGE_CONFLICT)
                .dev_msg(msg)
                .build(),
        ))
    }

    /// Wraps a store-native failure. The operations layer decides the final
    /// HTTP status from `meta.native_code`.
    pub fn native(err: NativeError) -> Self {
        StorageError(Box::new(
            ErrorBuilder::new(codes::STORAGE_NATIVE)
                .dev_msg(err.message.clone())
                .meta_kv("native_code", json!(err.code))
                .build(),
        ))
    }

    pub fn internal(msg: &str) -> Self {
        StorageError(Box::new(
            ErrorBuilder::new(codes::UNKNOWN_INTERNAL)
                .dev_msg(msg)
                .build(),
        ))
    }
}

impl From<NativeError> for StorageError {
    fn from(err: NativeError) -> Self {
        StorageError::native(err)
    }
}
