//! Store-native error codes. Numbering follows the MongoDB server so the
//! operations layer can map them to HTTP statuses with one table.

use std::fmt;

pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const UNAUTHORIZED: i32 = 13;
    pub const TYPE_MISMATCH: i32 = 14;
    pub const PATH_NOT_VIABLE: i32 = 28;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const NO_MATCHING_DOCUMENT: i32 = 47;
    pub const INVALID_PATH: i32 = 56;
    pub const SHARD_KEY_NOT_FOUND: i32 = 61;
    pub const IMMUTABLE_FIELD: i32 = 66;
    pub const WRITE_CONFLICT: i32 = 112;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const NO_SUCH_TRANSACTION: i32 = 251;
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const DB_ALREADY_EXISTS_DIFFERENT_CASE: i32 = 13297;
    pub const FIELD_PATH_TRAILING_DOT: i32 = 40353;
}

/// Error reported by the store for one operation or one bulk item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_VALUE, message)
    }

    pub fn duplicate_key(ns: &str, id: &serde_json::Value) -> Self {
        Self::new(
            codes::DUPLICATE_KEY,
            format!("E11000 duplicate key error collection: {ns} index: _id_ dup key: {{ _id: {id} }}"),
        )
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for NativeError {}
