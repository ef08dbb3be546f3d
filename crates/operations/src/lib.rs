//! Concurrency control and bulk aggregation between the request pipeline and
//! the document store.

pub mod bulk;
pub mod errors;
pub mod etag;
pub mod prelude;
pub mod result;
pub mod taxonomy;

pub use bulk::{BulkAggregator, BulkPolicy};
pub use errors::OperationError;
pub use etag::{EtagController, EtagPolicy, WriteConditions};
pub use result::{BulkItemError, BulkOperationResult, OperationResult};
