use docgate_acl::AclError;
use docgate_core_types::{Method, ResourceType, TypesError};
use docgate_errors::prelude::*;
use docgate_operations::OperationError;
use docgate_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0:?}")]
pub struct PipelineError(pub ErrorObj);

impl PipelineError {
    pub fn into_inner(self) -> ErrorObj {
        self.0
    }

    pub fn internal(msg: &str) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::UNKNOWN_INTERNAL)
                .dev_msg(msg)
                .build(),
        )
    }

    pub fn from_public(code: ErrorCode, msg: &str) -> Self {
        PipelineError(ErrorBuilder::new(code).user_msg(msg).build())
    }

    pub fn unauthenticated(msg: &str) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::AUTH_UNAUTHENTICATED)
                .dev_msg(msg)
                .build(),
        )
    }

    pub fn forbidden(msg: &str) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::AUTH_FORBIDDEN)
                .dev_msg(msg)
                .build(),
        )
    }

    pub fn malformed_query(msg: impl Into<String>) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::REQUEST_MALFORMED_QUERY)
                .user_msg(msg)
                .build(),
        )
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::REQUEST_INVALID_BODY)
                .user_msg(msg)
                .build(),
        )
    }

    pub fn payload_too_large(limit: usize) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::REQUEST_INVALID_BODY)
                .user_msg(format!("request body exceeds {limit} bytes"))
                .http_status(413)
                .build(),
        )
    }

    pub fn not_implemented(method: Method, resource_type: ResourceType) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::REQUEST_NOT_IMPLEMENTED)
                .dev_msg(format!("{method} on {resource_type}"))
                .build(),
        )
    }

    pub fn reserved_resource(path: &str) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::ID_RESERVED)
                .user_msg("The resource is reserved.")
                .dev_msg(path)
                .build(),
        )
    }

    pub fn not_found(msg: &str) -> Self {
        PipelineError(
            ErrorBuilder::new(codes::STORAGE_NOT_FOUND)
                .dev_msg(msg)
                .build(),
        )
    }
}

impl From<ErrorObj> for PipelineError {
    fn from(value: ErrorObj) -> Self {
        PipelineError(value)
    }
}

impl From<OperationError> for PipelineError {
    fn from(value: OperationError) -> Self {
        PipelineError(value.into_inner())
    }
}

impl From<AclError> for PipelineError {
    fn from(value: AclError) -> Self {
        PipelineError(value.into_inner())
    }
}

impl From<StorageError> for PipelineError {
    fn from(value: StorageError) -> Self {
        OperationError::from(value).into()
    }
}

impl From<TypesError> for PipelineError {
    fn from(value: TypesError) -> Self {
        let code = match value {
            TypesError::InvalidIdType(_) => codes::REQUEST_MALFORMED_QUERY,
            TypesError::InvalidPath(_) => codes::REQUEST_MALFORMED_QUERY,
            TypesError::InvalidObjectId(_) | TypesError::IdNotValidForType { .. } => {
                codes::ID_TYPE_MISMATCH
            }
        };
        PipelineError(ErrorBuilder::new(code).user_msg(value.to_string()).build())
    }
}

/// Status and public body for an error that escaped the chain.
pub fn to_http_response(err: &PipelineError) -> (u16, serde_json::Value) {
    (err.0.http_status, err.0.to_http_body())
}

impl From<PipelineError> for ErrorObj {
    fn from(value: PipelineError) -> Self {
        value.0
    }
}
