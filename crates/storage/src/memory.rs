use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use docgate_core_types::ObjectId;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::errors::StorageError;
use crate::filter::{matches, project, sort_documents};
use crate::model::{
    props, with_id, BulkUpsert, ConditionalOutcome, EtagGuard, FindQuery, GuardCheck, Mutation,
    Namespace, NativeBulkResult, NativeWriteError, WriteModel,
};
use crate::native::NativeError;
use crate::observe;
use crate::spi::DocumentStore;
use crate::update::{apply_update, has_operators};

/// In-process document store. One lock covers the whole namespace tree, so
/// each guarded write and each bulk write is a single critical section.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    dbs: RwLock<BTreeMap<String, Database>>,
}

#[derive(Default)]
struct Database {
    colls: BTreeMap<String, Collection>,
}

/// Documents in insertion order plus an `_id` index.
#[derive(Default)]
struct Collection {
    docs: BTreeMap<u64, Value>,
    ids: HashMap<String, u64>,
    next_seq: u64,
}

fn id_key(id: &Value) -> String {
    id.to_string()
}

impl Collection {
    fn get(&self, id: &Value) -> Option<&Value> {
        self.ids.get(&id_key(id)).and_then(|seq| self.docs.get(seq))
    }

    fn contains(&self, id: &Value) -> bool {
        self.ids.contains_key(&id_key(id))
    }

    /// Inserts or replaces by `_id`, keeping the original position on replace.
    fn put(&mut self, doc: Value) {
        let key = id_key(doc.get("_id").unwrap_or(&Value::Null));
        match self.ids.get(&key) {
            Some(seq) => {
                self.docs.insert(*seq, doc);
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.ids.insert(key, seq);
                self.docs.insert(seq, doc);
            }
        }
    }

    fn remove(&mut self, id: &Value) -> Option<Value> {
        let seq = self.ids.remove(&id_key(id))?;
        self.docs.remove(&seq)
    }

    fn iter(&self) -> impl Iterator<Item = &Value> {
        self.docs.values()
    }

    fn matching_ids(&self, filter: &Value, limit: Option<usize>) -> Result<Vec<Value>, NativeError> {
        let mut out = Vec::new();
        for doc in self.iter() {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            if matches(doc, filter)? {
                out.push(doc.get("_id").cloned().unwrap_or(Value::Null));
            }
        }
        Ok(out)
    }
}

/// Equality fields of a filter, used to seed upserted documents.
fn seed_from_filter(filter: &Value) -> Map<String, Value> {
    let mut seed = Map::new();
    if let Some(map) = filter.as_object() {
        for (key, value) in map {
            let is_expr = value
                .as_object()
                .is_some_and(|m| m.keys().any(|k| k.starts_with('$') && k != "$oid" && k != "$date"));
            if !key.starts_with('$') && !key.contains('.') && !is_expr {
                seed.insert(key.clone(), value.clone());
            }
        }
    }
    seed
}

fn replacement_error() -> NativeError {
    NativeError::bad_value("replacement document must not contain update operators")
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_coll<T>(&self, ns: &Namespace, f: impl FnOnce(Option<&Collection>) -> T) -> T {
        let dbs = self.inner.dbs.read();
        f(dbs.get(&ns.db).and_then(|db| db.colls.get(&ns.coll)))
    }

    pub fn conditional_write_sync(
        &self,
        ns: &Namespace,
        id: &Value,
        guard: &EtagGuard,
        mutation: Mutation,
    ) -> Result<ConditionalOutcome, StorageError> {
        let op = observe::operation("conditional_write", Some(&ns.to_string()));
        let mut dbs = self.inner.dbs.write();
        let current = dbs
            .get(&ns.db)
            .and_then(|db| db.colls.get(&ns.coll))
            .and_then(|coll| coll.get(id))
            .cloned();

        if let (Some(doc), Some(filter)) = (&current, &guard.filter) {
            if !matches(doc, filter)? {
                op.finish(0, None);
                return match mutation {
                    Mutation::Delete => Ok(ConditionalOutcome::NotFound),
                    _ => Err(NativeError::duplicate_key(&ns.to_string(), id).into()),
                };
            }
        }

        match (guard.check(current.as_ref()), current) {
            (GuardCheck::Missing, Some(current)) => {
                op.finish(0, None);
                return Ok(ConditionalOutcome::EtagMissing { current });
            }
            (GuardCheck::Mismatch, Some(current)) => {
                op.finish(0, None);
                return Ok(ConditionalOutcome::EtagMismatch { current });
            }
            (_, current) => {
                let outcome = apply_mutation(&mut dbs, ns, id, guard, current, mutation);
                if let Ok(ConditionalOutcome::Created { .. } | ConditionalOutcome::Updated { .. }) =
                    &outcome
                {
                    create_described_collection(&mut dbs, ns, id);
                }
                op.finish(1, outcome.as_ref().err().and_then(|e| e.native_code()).map(|c| c as i32));
                outcome
            }
        }
    }

    pub fn drop_collection_sync(
        &self,
        db: &str,
        coll: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError> {
        let mut dbs = self.inner.dbs.write();
        let Some(database) = dbs.get_mut(db) else {
            return Ok(ConditionalOutcome::NotFound);
        };
        let props_id = props::coll_id(coll);
        let current = database
            .colls
            .get(props::COLLECTION)
            .and_then(|c| c.get(&props_id))
            .cloned();
        if current.is_none() && !database.colls.contains_key(coll) {
            return Ok(ConditionalOutcome::NotFound);
        }
        match guard.check(current.as_ref()) {
            GuardCheck::Missing => {
                return Ok(ConditionalOutcome::EtagMissing {
                    current: current.unwrap_or(Value::Null),
                })
            }
            GuardCheck::Mismatch => {
                return Ok(ConditionalOutcome::EtagMismatch {
                    current: current.unwrap_or(Value::Null),
                })
            }
            GuardCheck::Pass => {}
        }
        database.colls.remove(coll);
        if let Some(props_coll) = database.colls.get_mut(props::COLLECTION) {
            props_coll.remove(&props_id);
        }
        observe::record("drop_collection", Some(coll), Default::default(), 1, None);
        Ok(ConditionalOutcome::Deleted {
            old: current.unwrap_or(Value::Null),
        })
    }

    pub fn drop_database_sync(
        &self,
        db: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError> {
        let mut dbs = self.inner.dbs.write();
        let Some(database) = dbs.get(db) else {
            return Ok(ConditionalOutcome::NotFound);
        };
        let current = database
            .colls
            .get(props::COLLECTION)
            .and_then(|c| c.get(&props::db_id()))
            .cloned();
        match guard.check(current.as_ref()) {
            GuardCheck::Missing => {
                return Ok(ConditionalOutcome::EtagMissing {
                    current: current.unwrap_or(Value::Null),
                })
            }
            GuardCheck::Mismatch => {
                return Ok(ConditionalOutcome::EtagMismatch {
                    current: current.unwrap_or(Value::Null),
                })
            }
            GuardCheck::Pass => {}
        }
        dbs.remove(db);
        observe::record("drop_database", Some(db), Default::default(), 1, None);
        Ok(ConditionalOutcome::Deleted {
            old: current.unwrap_or(Value::Null),
        })
    }

    pub fn bulk_write_sync(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
    ) -> Result<NativeBulkResult, StorageError> {
        let op = observe::operation("bulk_write", Some(&ns.to_string()));
        let mut dbs = self.inner.dbs.write();
        let coll = dbs
            .entry(ns.db.clone())
            .or_default()
            .colls
            .entry(ns.coll.clone())
            .or_default();
        let mut result = NativeBulkResult {
            acknowledged: true,
            ..NativeBulkResult::default()
        };
        for (index, model) in models.into_iter().enumerate() {
            if let Err(err) = apply_model(coll, ns, index, model, &mut result) {
                result.write_errors.push(NativeWriteError {
                    index,
                    code: err.code,
                    message: err.message,
                });
            }
        }
        op.finish(
            (result.inserted_count + result.modified_count + result.deleted_count) as usize,
            result.write_errors.first().map(|e| e.code),
        );
        Ok(result)
    }
}

/// Writing a collection properties document creates the collection it
/// describes, under the same lock as the write.
fn create_described_collection(dbs: &mut BTreeMap<String, Database>, ns: &Namespace, id: &Value) {
    if ns.coll != props::COLLECTION {
        return;
    }
    if let Some(coll) = props::coll_of(id) {
        dbs.entry(ns.db.clone())
            .or_default()
            .colls
            .entry(coll.to_string())
            .or_default();
    }
}

fn apply_mutation(
    dbs: &mut BTreeMap<String, Database>,
    ns: &Namespace,
    id: &Value,
    guard: &EtagGuard,
    current: Option<Value>,
    mutation: Mutation,
) -> Result<ConditionalOutcome, StorageError> {
    let coll = dbs
        .entry(ns.db.clone())
        .or_default()
        .colls
        .entry(ns.coll.clone())
        .or_default();
    match mutation {
        Mutation::Delete => Ok(match current {
            Some(_) => ConditionalOutcome::Deleted {
                old: coll.remove(id).unwrap_or(Value::Null),
            },
            None => ConditionalOutcome::NotFound,
        }),
        Mutation::Insert(doc) => {
            if current.is_some() {
                return Err(NativeError::duplicate_key(&ns.to_string(), id).into());
            }
            if has_operators(&doc) {
                return Err(replacement_error().into());
            }
            let mut new = with_id(&doc, id);
            guard.stamp(&mut new);
            coll.put(new.clone());
            Ok(ConditionalOutcome::Created { new })
        }
        Mutation::Replace(doc) => {
            if has_operators(&doc) {
                return Err(replacement_error().into());
            }
            let mut new = with_id(&doc, id);
            guard.stamp(&mut new);
            coll.put(new.clone());
            Ok(match current {
                Some(old) => ConditionalOutcome::Updated { old, new },
                None => ConditionalOutcome::Created { new },
            })
        }
        Mutation::Update(update) => {
            let mut new = match &current {
                Some(doc) => doc.clone(),
                None => {
                    let mut seed = guard
                        .filter
                        .as_ref()
                        .map(seed_from_filter)
                        .unwrap_or_default();
                    seed.insert("_id".into(), id.clone());
                    Value::Object(seed)
                }
            };
            apply_update(&mut new, &update)?;
            guard.stamp(&mut new);
            coll.put(new.clone());
            Ok(match current {
                Some(old) => ConditionalOutcome::Updated { old, new },
                None => ConditionalOutcome::Created { new },
            })
        }
    }
}

fn apply_model(
    coll: &mut Collection,
    ns: &Namespace,
    index: usize,
    model: WriteModel,
    result: &mut NativeBulkResult,
) -> Result<(), NativeError> {
    match model {
        WriteModel::InsertOne { document } => {
            if has_operators(&document) {
                return Err(replacement_error());
            }
            let id = document
                .get("_id")
                .cloned()
                .unwrap_or_else(|| ObjectId::new().to_json());
            if coll.contains(&id) {
                return Err(NativeError::duplicate_key(&ns.to_string(), &id));
            }
            coll.put(with_id(&document, &id));
            result.inserted_count += 1;
            result.inserted_ids.push(BulkUpsert { index, id });
        }
        WriteModel::ReplaceOne {
            filter,
            replacement,
            upsert,
        } => {
            if has_operators(&replacement) {
                return Err(replacement_error());
            }
            match coll.matching_ids(&filter, Some(1))?.into_iter().next() {
                Some(id) => {
                    let new = with_id(&replacement, &id);
                    result.matched_count += 1;
                    if coll.get(&id) != Some(&new) {
                        result.modified_count += 1;
                    }
                    coll.put(new);
                }
                None if upsert => {
                    let id = seed_from_filter(&filter)
                        .remove("_id")
                        .or_else(|| replacement.get("_id").cloned())
                        .unwrap_or_else(|| ObjectId::new().to_json());
                    if coll.contains(&id) {
                        return Err(NativeError::duplicate_key(&ns.to_string(), &id));
                    }
                    coll.put(with_id(&replacement, &id));
                    result.upserts.push(BulkUpsert { index, id });
                }
                None => {}
            }
        }
        WriteModel::UpdateOne {
            filter,
            update,
            upsert,
        } => match coll.matching_ids(&filter, Some(1))?.into_iter().next() {
            Some(id) => update_existing(coll, &id, &update, result)?,
            None if upsert => {
                let mut seed = seed_from_filter(&filter);
                let id = seed
                    .get("_id")
                    .cloned()
                    .unwrap_or_else(|| ObjectId::new().to_json());
                seed.insert("_id".into(), id.clone());
                if coll.contains(&id) {
                    return Err(NativeError::duplicate_key(&ns.to_string(), &id));
                }
                let mut doc = Value::Object(seed);
                apply_update(&mut doc, &update)?;
                coll.put(doc);
                result.upserts.push(BulkUpsert { index, id });
            }
            None => {}
        },
        WriteModel::UpdateMany { filter, update } => {
            for id in coll.matching_ids(&filter, None)? {
                update_existing(coll, &id, &update, result)?;
            }
        }
        WriteModel::DeleteOne { filter } => {
            if let Some(id) = coll.matching_ids(&filter, Some(1))?.into_iter().next() {
                coll.remove(&id);
                result.deleted_count += 1;
            }
        }
        WriteModel::DeleteMany { filter } => {
            for id in coll.matching_ids(&filter, None)? {
                coll.remove(&id);
                result.deleted_count += 1;
            }
        }
    }
    Ok(())
}

fn update_existing(
    coll: &mut Collection,
    id: &Value,
    update: &Value,
    result: &mut NativeBulkResult,
) -> Result<(), NativeError> {
    let Some(old) = coll.get(id).cloned() else {
        return Ok(());
    };
    let mut new = old.clone();
    apply_update(&mut new, update)?;
    result.matched_count += 1;
    if new != old {
        result.modified_count += 1;
        coll.put(new);
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_databases(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.dbs.read().keys().cloned().collect())
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .inner
            .dbs
            .read()
            .get(db)
            .map(|d| d.colls.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(&self, ns: &Namespace, filter: &Value) -> Result<Option<Value>, StorageError> {
        self.read_coll(ns, |coll| -> Result<Option<Value>, StorageError> {
            let Some(coll) = coll else {
                return Ok(None);
            };
            for doc in coll.iter() {
                if matches(doc, filter)? {
                    return Ok(Some(doc.clone()));
                }
            }
            Ok(None)
        })
    }

    async fn find(&self, ns: &Namespace, query: &FindQuery) -> Result<Vec<Value>, StorageError> {
        let op = observe::operation("find", Some(&ns.to_string()));
        let mut docs = self.read_coll(ns, |coll| -> Result<Vec<Value>, NativeError> {
            let mut out = Vec::new();
            for doc in coll.into_iter().flat_map(Collection::iter) {
                if matches(doc, &query.filter)? {
                    out.push(doc.clone());
                }
            }
            Ok(out)
        })?;
        if let Some(sort) = &query.sort {
            sort_documents(&mut docs, sort)?;
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut page = Vec::new();
        for doc in docs.into_iter().skip(query.skip).take(limit) {
            page.push(match &query.keys {
                Some(keys) => project(&doc, keys)?,
                None => doc,
            });
        }
        op.finish(page.len(), None);
        Ok(page)
    }

    async fn count(&self, ns: &Namespace, filter: &Value) -> Result<u64, StorageError> {
        self.read_coll(ns, |coll| -> Result<u64, StorageError> {
            let mut n = 0;
            for doc in coll.into_iter().flat_map(Collection::iter) {
                if matches(doc, filter)? {
                    n += 1;
                }
            }
            Ok(n)
        })
    }

    async fn conditional_write(
        &self,
        ns: &Namespace,
        id: &Value,
        guard: &EtagGuard,
        mutation: Mutation,
    ) -> Result<ConditionalOutcome, StorageError> {
        self.conditional_write_sync(ns, id, guard, mutation)
    }

    async fn drop_collection(
        &self,
        db: &str,
        coll: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError> {
        self.drop_collection_sync(db, coll, guard)
    }

    async fn drop_database(
        &self,
        db: &str,
        guard: &EtagGuard,
    ) -> Result<ConditionalOutcome, StorageError> {
        self.drop_database_sync(db, guard)
    }

    async fn bulk_write(
        &self,
        ns: &Namespace,
        models: Vec<WriteModel>,
    ) -> Result<NativeBulkResult, StorageError> {
        self.bulk_write_sync(ns, models)
    }
}
