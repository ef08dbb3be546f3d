pub use crate::bulk::{document_link, preflight, BulkAggregator, BulkPolicy};
pub use crate::errors::OperationError;
pub use crate::etag::{
    and_filter, check_required, policy_property, EtagCheckInputs, EtagController, EtagPolicy,
    WriteConditions,
};
pub use crate::result::{BulkItemError, BulkOperationResult, OperationResult, OperationResultBuilder};
