use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StorageError;
use crate::model::{
    ConditionalOutcome, EtagGuard, FindQuery, Mutation, Namespace, NativeBulkResult, WriteModel,
};

/// Document store seen by the gateway. Every method that takes an
/// [`EtagGuard`] evaluates it and applies the change in one atomic step.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>, StorageError>;

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, StorageError>;

    async fn find_one(&self, ns: &Namespace, filter: &Value) -> Result<Option<Value>, StorageError>;

    async fn find(&self, ns: &Namespace, query: &FindQuery) -> Result<Vec<Value>, StorageError>;

    async fn count(&self, ns: &Namespace, filter: &Value) -> Result<u64, StorageError>;

    /// Guarded single-document write. A write to a collection properties
    /// document in `<db>/_properties` also creates that collection.
    async fn conditional_write(
        &self,
        ns: &Namespace,
        id: &Value,
        guard: &EtagGuard,
        mutation: Mutation,
    ) -> Result<ConditionalOutcome, StorageError>;

    /// Drops a collection and its properties document. The guard applies to
    /// the properties document.
    async fn drop_collection(
        &self,
        db: &str,
        coll: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError>;

    async fn drop_database(
        &self,
        db: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError>;

    /// Unordered bulk write: a failing model is reported in `write_errors`
    /// and the remaining models still run.
    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
    ) -> Result<NativeBulkResult, StorageError>;
}
