use std::fmt;

use docgate_core_types::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `db.collection` pair addressed by a store call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Namespace holding the database and collection properties documents.
    pub fn properties(db: impl Into<String>) -> Self {
        Self::new(db, props::COLLECTION)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Layout of the properties documents inside `<db>/_properties`.
pub mod props {
    use serde_json::{json, Value};

    pub const COLLECTION: &str = "_properties";
    pub const DB_DOC_ID: &str = "_properties";
    pub const COLL_DOC_PREFIX: &str = "_properties.";

    pub fn db_id() -> Value {
        json!(DB_DOC_ID)
    }

    pub fn coll_id(coll: &str) -> Value {
        Value::String(format!("{COLL_DOC_PREFIX}{coll}"))
    }

    /// Collection name for a properties document id, if it is one.
    pub fn coll_of(id: &Value) -> Option<&str> {
        id.as_str()?.strip_prefix(COLL_DOC_PREFIX)
    }
}

/// Hex etag stored in `_etag`, accepting both the `{"$oid": ..}` form and a
/// plain string.
pub fn etag_of(doc: &Value) -> Option<String> {
    match doc.get("_etag")? {
        Value::String(s) => Some(s.clone()),
        other => ObjectId::from_json(other).map(|oid| oid.to_hex()),
    }
}

#[derive(Clone, Debug, Default)]
pub struct FindQuery {
    pub filter: Value,
    pub sort: Option<Value>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub keys: Option<Value>,
}

impl FindQuery {
    pub fn filter(filter: Value) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// Precondition evaluated inside the store's critical section.
#[derive(Clone, Debug, Default)]
pub struct EtagGuard {
    /// Etag supplied by the client (`If-Match`).
    pub expected: Option<String>,
    /// Whether an etag must be supplied when the resource has one.
    pub required: bool,
    /// Etag written with the mutation.
    pub new_etag: Option<ObjectId>,
    /// Extra filter the current document must satisfy (ACL write filter).
    pub filter: Option<Value>,
}

pub(crate) enum GuardCheck {
    Pass,
    Missing,
    Mismatch,
}

impl EtagGuard {
    pub fn new(expected: Option<String>, required: bool) -> Self {
        Self {
            expected,
            required,
            new_etag: Some(ObjectId::new()),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<Value>) -> Self {
        self.filter = filter;
        self
    }

    /// Creation is never etag checked. A document without a stored etag
    /// only passes when the client supplied none.
    pub(crate) fn check(&self, current: Option<&Value>) -> GuardCheck {
        let Some(current) = current else {
            return GuardCheck::Pass;
        };
        match (etag_of(current), &self.expected) {
            (None, None) => GuardCheck::Pass,
            (None, Some(_)) => GuardCheck::Mismatch,
            (Some(_), None) if self.required => GuardCheck::Missing,
            (Some(stored), Some(expected)) if *expected != stored => GuardCheck::Mismatch,
            _ => GuardCheck::Pass,
        }
    }

    pub(crate) fn stamp(&self, doc: &mut Value) {
        if let (Some(etag), Some(map)) = (&self.new_etag, doc.as_object_mut()) {
            map.insert("_etag".into(), etag.to_json());
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Replace(Value),
    /// Operator document, or plain fields treated as `$set`.
    Update(Value),
    /// Fails with a duplicate key error when the id exists.
    Insert(Value),
    Delete,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Replace(_) => "replace",
            Mutation::Update(_) => "update",
            Mutation::Insert(_) => "insert",
            Mutation::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConditionalOutcome {
    Created { new: Value },
    Updated { old: Value, new: Value },
    Deleted { old: Value },
    NotFound,
    EtagMissing { current: Value },
    EtagMismatch { current: Value },
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteModel {
    InsertOne { document: Value },
    ReplaceOne { filter: Value, replacement: Value, upsert: bool },
    UpdateOne { filter: Value, update: Value, upsert: bool },
    UpdateMany { filter: Value, update: Value },
    DeleteOne { filter: Value },
    DeleteMany { filter: Value },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BulkUpsert {
    pub index: usize,
    pub id: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NativeWriteError {
    pub index: usize,
    pub code: i32,
    pub message: String,
}

/// Store answer to a `bulk_write`. Counters are meaningful only when
/// `acknowledged`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NativeBulkResult {
    pub acknowledged: bool,
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserts: Vec<BulkUpsert>,
    pub inserted_ids: Vec<BulkUpsert>,
    pub write_errors: Vec<NativeWriteError>,
}

pub(crate) fn with_id(doc: &Value, id: &Value) -> Value {
    let mut out = Map::new();
    out.insert("_id".into(), id.clone());
    if let Some(map) = doc.as_object() {
        for (k, v) in map {
            if k != "_id" {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}
