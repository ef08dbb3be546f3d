pub use crate::errors::StorageError;
pub use crate::memory::MemoryStore;
pub use crate::model::{
    etag_of, props, BulkUpsert, ConditionalOutcome, EtagGuard, FindQuery, Mutation,
    Namespace, NativeBulkResult, NativeWriteError, WriteModel,
};
pub use crate::native::{codes as native_codes, NativeError};
pub use crate::spi::DocumentStore;
