//! Etag-based optimistic concurrency. Every write is a single guarded store
//! call; the controller only interprets the outcome.

use std::str::FromStr;
use std::sync::Arc;

use docgate_core_types::Method;
use docgate_storage::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::OperationError;
use crate::result::OperationResult;

/// Per-resource etag requirement, configured globally or through the
/// `etagPolicy` / `etagDocPolicy` properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EtagPolicy {
    Required,
    #[default]
    RequiredForDelete,
    Optional,
}

impl EtagPolicy {
    pub fn requires_check(self, method: Method) -> bool {
        match self {
            EtagPolicy::Required => method.is_write(),
            EtagPolicy::RequiredForDelete => method == Method::Delete,
            EtagPolicy::Optional => false,
        }
    }
}

impl FromStr for EtagPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUIRED" => Ok(EtagPolicy::Required),
            "REQUIRED_FOR_DELETE" => Ok(EtagPolicy::RequiredForDelete),
            "OPTIONAL" => Ok(EtagPolicy::Optional),
            other => Err(format!("unknown etag policy {other}")),
        }
    }
}

/// Policy stored under `key` in a properties document, if it parses.
pub fn policy_property(props: Option<&Value>, key: &str) -> Option<EtagPolicy> {
    props?.get(key)?.as_str()?.parse().ok()
}

/// Inputs to the etag-check decision, strongest first: the `If-Match`
/// header, the `checkEtag` parameter, then properties from the most specific
/// scope outwards, then the configured default.
#[derive(Clone, Copy, Debug)]
pub struct EtagCheckInputs<'a> {
    pub method: Method,
    pub if_match: bool,
    pub check_etag_param: bool,
    pub scoped: &'a [Option<EtagPolicy>],
    pub fallback: EtagPolicy,
}

pub fn check_required(inputs: &EtagCheckInputs<'_>) -> bool {
    if inputs.if_match || inputs.check_etag_param {
        return true;
    }
    let policy = inputs
        .scoped
        .iter()
        .flatten()
        .next()
        .copied()
        .unwrap_or(inputs.fallback);
    policy.requires_check(inputs.method)
}

/// Request-side conditions for one guarded write.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteConditions<'a> {
    pub expected_etag: Option<&'a str>,
    pub check_required: bool,
    pub write_filter: Option<&'a Value>,
}

impl WriteConditions<'_> {
    fn guard(&self) -> EtagGuard {
        EtagGuard::new(self.expected_etag.map(str::to_string), self.check_required)
            .with_filter(self.write_filter.cloned())
    }
}

#[derive(Clone)]
pub struct EtagController {
    store: Arc<dyn DocumentStore>,
}

impl EtagController {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn write(
        &self,
        ns: &Namespace,
        id: &Value,
        conditions: &WriteConditions<'_>,
        mutation: Mutation,
    ) -> OperationResult {
        let inserting = matches!(mutation, Mutation::Insert(_));
        let op = mutation.name();
        let outcome = self
            .store
            .conditional_write(ns, id, &conditions.guard(), mutation)
            .await;
        match outcome {
            Err(err) if inserting && err.native_code() == Some(i64::from(native_codes::DUPLICATE_KEY)) => {
                OperationResult::failed(OperationError::conflict(&format!(
                    "document {id} already exists"
                )))
            }
            Err(err) => OperationResult::failed(err.into()),
            Ok(outcome) => {
                debug!(ns = %ns, op, "conditional write applied");
                from_outcome(outcome)
            }
        }
    }

    pub async fn delete(
        &self,
        ns: &Namespace,
        id: &Value,
        conditions: &WriteConditions<'_>,
    ) -> OperationResult {
        match self
            .store
            .conditional_write(ns, id, &conditions.guard(), Mutation::Delete)
            .await
        {
            Ok(outcome) => from_outcome(outcome),
            Err(err) => OperationResult::failed(err.into()),
        }
    }

    /// Document and its etag, with the read filter ANDed in.
    pub async fn read(
        &self,
        ns: &Namespace,
        id: &Value,
        read_filter: Option<&Value>,
    ) -> Result<Option<(Value, Option<String>)>, OperationError> {
        let filter = and_filter(json!({ "_id": id }), read_filter);
        let doc = self.store.find_one(ns, &filter).await?;
        Ok(doc.map(|doc| {
            let etag = etag_of(&doc);
            (doc, etag)
        }))
    }

    pub async fn database_properties(&self, db: &str) -> Result<Option<Value>, OperationError> {
        let filter = json!({ "_id": props::db_id() });
        Ok(self
            .store
            .find_one(&Namespace::properties(db), &filter)
            .await?)
    }

    pub async fn collection_properties(
        &self,
        db: &str,
        coll: &str,
    ) -> Result<Option<Value>, OperationError> {
        let filter = json!({ "_id": props::coll_id(coll) });
        Ok(self
            .store
            .find_one(&Namespace::properties(db), &filter)
            .await?)
    }

    pub async fn write_database_properties(
        &self,
        db: &str,
        conditions: &WriteConditions<'_>,
        mutation: Mutation,
    ) -> OperationResult {
        self.write(&Namespace::properties(db), &props::db_id(), conditions, mutation)
            .await
    }

    /// Writes the collection properties document. The store creates the
    /// collection in the same step.
    pub async fn write_collection_properties(
        &self,
        db: &str,
        coll: &str,
        conditions: &WriteConditions<'_>,
        mutation: Mutation,
    ) -> OperationResult {
        self.write(&Namespace::properties(db), &props::coll_id(coll), conditions, mutation)
            .await
    }

    pub async fn drop_collection(
        &self,
        db: &str,
        coll: &str,
        conditions: &WriteConditions<'_>,
    ) -> OperationResult {
        match self
            .store
            .drop_collection(db, coll, &conditions.guard())
            .await
        {
            Ok(outcome) => from_outcome(outcome),
            Err(err) => OperationResult::failed(err.into()),
        }
    }

    pub async fn drop_database(&self, db: &str, conditions: &WriteConditions<'_>) -> OperationResult {
        match self.store.drop_database(db, &conditions.guard()).await {
            Ok(outcome) => from_outcome(outcome),
            Err(err) => OperationResult::failed(err.into()),
        }
    }
}

fn from_outcome(outcome: ConditionalOutcome) -> OperationResult {
    match outcome {
        ConditionalOutcome::Created { new } => OperationResult::builder(201)
            .etag(etag_of(&new))
            .new_data(new)
            .build(),
        ConditionalOutcome::Updated { old, new } => OperationResult::builder(200)
            .etag(etag_of(&new))
            .old_data(old)
            .new_data(new)
            .build(),
        ConditionalOutcome::Deleted { old } => OperationResult::builder(204).old_data(old).build(),
        ConditionalOutcome::NotFound => {
            OperationResult::failed(OperationError::not_found("resource does not exist"))
        }
        ConditionalOutcome::EtagMissing { .. } => {
            debug!("write rejected, etag required but missing");
            OperationResult::failed(OperationError::etag_required())
        }
        ConditionalOutcome::EtagMismatch { current } => {
            let etag = etag_of(&current);
            debug!(current = ?etag, "write rejected, etag mismatch");
            OperationResult::builder(412)
                .etag(etag.clone())
                .old_data(current)
                .cause(OperationError::etag_mismatch(etag.as_deref()))
                .build()
        }
    }
}

/// `{"$and": [base, extra]}`, or `base` alone when there is no extra filter.
pub fn and_filter(base: Value, extra: Option<&Value>) -> Value {
    match extra {
        Some(extra) if extra.as_object().is_some_and(|m| !m.is_empty()) => {
            json!({ "$and": [base, extra] })
        }
        _ => base,
    }
}
