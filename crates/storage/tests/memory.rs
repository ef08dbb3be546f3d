use docgate_core_types::ObjectId;
use docgate_storage::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn ns() -> Namespace {
    Namespace::new("shop", "orders")
}

async fn seed(store: &MemoryStore, id: &str, doc: Value) -> String {
    let outcome = store
        .conditional_write(&ns(), &json!(id), &EtagGuard::new(None, false), Mutation::Insert(doc))
        .await
        .unwrap();
    match outcome {
        ConditionalOutcome::Created { new } => etag_of(&new).unwrap(),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn create_ignores_etag_and_stamps_new_one() {
    let store = MemoryStore::new();
    let guard = EtagGuard::new(Some("whatever".into()), true);
    let outcome = store
        .conditional_write(&ns(), &json!("a"), &guard, Mutation::Replace(json!({"n": 1})))
        .await
        .unwrap();
    let ConditionalOutcome::Created { new } = outcome else {
        panic!("expected create");
    };
    assert_eq!(new["_id"], json!("a"));
    assert_eq!(etag_of(&new), guard.new_etag.map(|e| e.to_hex()));
}

#[tokio::test]
async fn required_etag_missing_leaves_document_untouched() {
    let store = MemoryStore::new();
    seed(&store, "a", json!({"n": 1})).await;

    let outcome = store
        .conditional_write(
            &ns(),
            &json!("a"),
            &EtagGuard::new(None, true),
            Mutation::Replace(json!({"n": 2})),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::EtagMissing { .. }));

    let current = store.find_one(&ns(), &json!({"_id": "a"})).await.unwrap().unwrap();
    assert_eq!(current["n"], json!(1));
}

#[tokio::test]
async fn mismatched_etag_returns_current_state() {
    let store = MemoryStore::new();
    let etag = seed(&store, "a", json!({"n": 1})).await;

    let stale = ObjectId::new().to_hex();
    let outcome = store
        .conditional_write(
            &ns(),
            &json!("a"),
            &EtagGuard::new(Some(stale), false),
            Mutation::Update(json!({"$inc": {"n": 1}})),
        )
        .await
        .unwrap();
    let ConditionalOutcome::EtagMismatch { current } = outcome else {
        panic!("expected mismatch");
    };
    assert_eq!(etag_of(&current), Some(etag.clone()));

    let outcome = store
        .conditional_write(
            &ns(),
            &json!("a"),
            &EtagGuard::new(Some(etag.clone()), true),
            Mutation::Update(json!({"$inc": {"n": 1}})),
        )
        .await
        .unwrap();
    let ConditionalOutcome::Updated { old, new } = outcome else {
        panic!("expected update");
    };
    assert_eq!(old["n"], json!(1));
    assert_eq!(new["n"], json!(2));
    assert_ne!(etag_of(&new), Some(etag));
}

#[tokio::test]
async fn duplicate_insert_reports_native_code() {
    let store = MemoryStore::new();
    seed(&store, "a", json!({})).await;
    let err = store
        .conditional_write(
            &ns(),
            &json!("a"),
            &EtagGuard::new(None, false),
            Mutation::Insert(json!({})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.native_code(), Some(native_codes::DUPLICATE_KEY as i64));
}

#[tokio::test]
async fn write_filter_hides_foreign_documents() {
    let store = MemoryStore::new();
    seed(&store, "a", json!({"author": "bob"})).await;
    let guard = EtagGuard::new(None, false).with_filter(Some(json!({"author": "alice"})));

    let outcome = store
        .conditional_write(&ns(), &json!("a"), &guard, Mutation::Delete)
        .await
        .unwrap();
    assert_eq!(outcome, ConditionalOutcome::NotFound);

    let err = store
        .conditional_write(&ns(), &json!("a"), &guard, Mutation::Replace(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.native_code(), Some(native_codes::DUPLICATE_KEY as i64));
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let store = MemoryStore::new();
    let outcome = store
        .conditional_write(&ns(), &json!("nope"), &EtagGuard::new(None, true), Mutation::Delete)
        .await
        .unwrap();
    assert_eq!(outcome, ConditionalOutcome::NotFound);
}

#[tokio::test]
async fn bulk_write_counts_and_errors() {
    let store = MemoryStore::new();
    seed(&store, "taken", json!({"n": 0})).await;

    let result = store
        .bulk_write(
            &ns(),
            vec![
                WriteModel::InsertOne {
                    document: json!({"n": 1}),
                },
                WriteModel::InsertOne {
                    document: json!({"_id": "taken", "n": 2}),
                },
                WriteModel::ReplaceOne {
                    filter: json!({"_id": "fresh"}),
                    replacement: json!({"_id": "fresh", "n": 3}),
                    upsert: true,
                },
                WriteModel::ReplaceOne {
                    filter: json!({"_id": "taken"}),
                    replacement: json!({"_id": "taken", "n": 4}),
                    upsert: true,
                },
            ],
        )
        .await
        .unwrap();

    assert!(result.acknowledged);
    assert_eq!(result.inserted_count, 1);
    assert_eq!(result.upserts.len(), 1);
    assert_eq!(result.upserts[0].index, 2);
    assert_eq!(result.upserts[0].id, json!("fresh"));
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.write_errors.len(), 1);
    assert_eq!(result.write_errors[0].index, 1);
    assert_eq!(result.write_errors[0].code, native_codes::DUPLICATE_KEY);

    assert_eq!(store.count(&ns(), &json!({})).await.unwrap(), 3);
}

#[tokio::test]
async fn bulk_update_and_delete_many() {
    let store = MemoryStore::new();
    for (id, n) in [("a", 1), ("b", 2), ("c", 3)] {
        seed(&store, id, json!({"n": n})).await;
    }
    let result = store
        .bulk_write(
            &ns(),
            vec![WriteModel::UpdateMany {
                filter: json!({"n": {"$gte": 2}}),
                update: json!({"$set": {"big": true}}),
            }],
        )
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (2, 2));

    let result = store
        .bulk_write(
            &ns(),
            vec![WriteModel::DeleteMany {
                filter: json!({"big": true}),
            }],
        )
        .await
        .unwrap();
    assert_eq!(result.deleted_count, 2);
    assert_eq!(store.count(&ns(), &json!({})).await.unwrap(), 1);
}

#[tokio::test]
async fn find_sorts_pages_and_projects() {
    let store = MemoryStore::new();
    for (id, n) in [("a", 3), ("b", 1), ("c", 2), ("d", 5)] {
        seed(&store, id, json!({"n": n, "tag": "x"})).await;
    }
    let query = FindQuery {
        filter: json!({"n": {"$lt": 5}}),
        sort: Some(json!({"n": -1})),
        skip: 1,
        limit: Some(2),
        keys: Some(json!({"n": 1})),
    };
    let page = store.find(&ns(), &query).await.unwrap();
    assert_eq!(page, vec![json!({"_id": "c", "n": 2}), json!({"_id": "b", "n": 1})]);
}

#[tokio::test]
async fn drop_collection_is_guarded_by_properties_etag() {
    let store = MemoryStore::new();
    seed(&store, "a", json!({})).await;
    let props_ns = Namespace::properties("shop");
    let created = store
        .conditional_write(
            &props_ns,
            &props::coll_id("orders"),
            &EtagGuard::new(None, false),
            Mutation::Replace(json!({"etagPolicy": "REQUIRED"})),
        )
        .await
        .unwrap();
    let ConditionalOutcome::Created { new } = created else {
        panic!("expected create");
    };
    let etag = etag_of(&new).unwrap();

    let outcome = store
        .drop_collection("shop", "orders", &EtagGuard::new(None, true))
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::EtagMissing { .. }));

    let outcome = store
        .drop_collection("shop", "orders", &EtagGuard::new(Some(etag), true))
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::Deleted { .. }));
    let colls = store.list_collections("shop").await.unwrap();
    assert_eq!(colls, vec![props::COLLECTION.to_string()]);
    assert!(store
        .find_one(&props_ns, &json!({"_id": "_properties.orders"}))
        .await
        .unwrap()
        .is_none());

    let outcome = store
        .drop_collection("shop", "orders", &EtagGuard::new(None, false))
        .await
        .unwrap();
    assert_eq!(outcome, ConditionalOutcome::NotFound);
}

#[tokio::test]
async fn drop_database_removes_everything() {
    let store = MemoryStore::new();
    seed(&store, "a", json!({})).await;
    assert_eq!(store.list_databases().await.unwrap(), vec!["shop".to_string()]);
    let outcome = store
        .drop_database("shop", &EtagGuard::new(None, true))
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::Deleted { .. }));
    assert!(store.list_databases().await.unwrap().is_empty());
}

#[tokio::test]
async fn properties_write_creates_the_collection_in_the_same_step() {
    let store = MemoryStore::new();
    let props_ns = Namespace::properties("shop");
    let stale = EtagGuard::new(Some(ObjectId::new().to_hex()), true);

    store
        .conditional_write(
            &props_ns,
            &props::coll_id("carts"),
            &EtagGuard::new(None, false),
            Mutation::Replace(json!({"etagPolicy": "OPTIONAL"})),
        )
        .await
        .unwrap();
    let outcome = store
        .conditional_write(
            &props_ns,
            &props::coll_id("carts"),
            &stale,
            Mutation::Replace(json!({})),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::EtagMismatch { .. }));

    let colls = store.list_collections("shop").await.unwrap();
    assert_eq!(colls, vec![props::COLLECTION.to_string(), "carts".to_string()]);

    store
        .conditional_write(
            &props_ns,
            &props::db_id(),
            &EtagGuard::new(None, false),
            Mutation::Replace(json!({})),
        )
        .await
        .unwrap();
    assert_eq!(store.list_collections("shop").await.unwrap().len(), 2);
}

#[tokio::test]
async fn etag_against_untagged_document_is_a_mismatch() {
    let store = MemoryStore::new();
    store
        .bulk_write(
            &ns(),
            vec![WriteModel::InsertOne {
                document: json!({"_id": "a", "n": 1}),
            }],
        )
        .await
        .unwrap();
    let outcome = store
        .conditional_write(
            &ns(),
            &json!("a"),
            &EtagGuard::new(Some(ObjectId::new().to_hex()), false),
            Mutation::Replace(json!({"n": 2})),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ConditionalOutcome::EtagMismatch { .. }));
    let current = store.find_one(&ns(), &json!({"_id": "a"})).await.unwrap().unwrap();
    assert_eq!(current["n"], json!(1));
}
