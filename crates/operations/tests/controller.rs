use std::sync::Arc;

use docgate_core_types::{DocIdType, ObjectId};
use docgate_errors::prelude::codes;
use docgate_operations::prelude::*;
use docgate_storage::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn setup() -> (Arc<MemoryStore>, EtagController, BulkAggregator) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    (
        store,
        EtagController::new(dyn_store.clone()),
        BulkAggregator::new(dyn_store),
    )
}

fn ns() -> Namespace {
    Namespace::new("blog", "posts")
}

fn open() -> WriteConditions<'static> {
    WriteConditions::default()
}

#[tokio::test]
async fn create_then_update_with_matching_etag() {
    let (_, ctl, _) = setup();
    let created = ctl
        .write(&ns(), &json!("p1"), &open(), Mutation::Replace(json!({"title": "a"})))
        .await;
    assert_eq!(created.http_code, 201);
    assert_eq!(created.new_id, Some(json!("p1")));
    let etag = created.etag.clone().unwrap();

    let updated = ctl
        .write(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                expected_etag: Some(&etag),
                check_required: true,
                write_filter: None,
            },
            Mutation::Update(json!({"title": "b"})),
        )
        .await;
    assert_eq!(updated.http_code, 200);
    assert_eq!(updated.old_data.unwrap()["title"], json!("a"));
    assert_eq!(updated.new_data.unwrap()["title"], json!("b"));
    assert_ne!(updated.etag, Some(etag));
}

#[tokio::test]
async fn missing_required_etag_is_409() {
    let (_, ctl, _) = setup();
    ctl.write(&ns(), &json!("p1"), &open(), Mutation::Replace(json!({})))
        .await;
    let result = ctl
        .write(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                check_required: true,
                ..open()
            },
            Mutation::Replace(json!({"x": 1})),
        )
        .await;
    assert_eq!(result.http_code, 409);
    let cause = result.cause.unwrap();
    assert_eq!(cause.code, codes::ETAG_REQUIRED);
    assert_eq!(
        cause.message_user,
        "The ETag must be provided using the 'If-Match' header."
    );
}

#[tokio::test]
async fn stale_etag_is_412_with_current_state() {
    let (_, ctl, _) = setup();
    let created = ctl
        .write(&ns(), &json!("p1"), &open(), Mutation::Replace(json!({"v": 1})))
        .await;
    let stale = ObjectId::new().to_hex();
    let result = ctl
        .write(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                expected_etag: Some(&stale),
                ..open()
            },
            Mutation::Replace(json!({"v": 2})),
        )
        .await;
    assert_eq!(result.http_code, 412);
    assert_eq!(result.etag, created.etag);
    assert_eq!(result.old_data.unwrap()["v"], json!(1));

    let (doc, _) = ctl.read(&ns(), &json!("p1"), None).await.unwrap().unwrap();
    assert_eq!(doc["v"], json!(1));
}

#[tokio::test]
async fn bulk_patch_cannot_strip_the_etag() {
    let (_, ctl, bulk) = setup();
    ctl.write(&ns(), &json!("p1"), &open(), Mutation::Replace(json!({"v": 1})))
        .await;

    let patched = bulk
        .bulk_update(&ns(), Some(&json!({})), &json!({"$unset": {"_etag": ""}}), None)
        .await;
    assert_eq!(patched.http_code, 200);
    let (_, stored) = ctl.read(&ns(), &json!("p1"), None).await.unwrap().unwrap();
    assert_eq!(stored, patched.etag);

    let stale = ObjectId::new().to_hex();
    let result = ctl
        .write(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                expected_etag: Some(&stale),
                check_required: true,
                write_filter: None,
            },
            Mutation::Replace(json!({"v": 2})),
        )
        .await;
    assert_eq!(result.http_code, 412);
    let (doc, _) = ctl.read(&ns(), &json!("p1"), None).await.unwrap().unwrap();
    assert_eq!(doc["v"], json!(1));
}

#[tokio::test]
async fn etag_against_untagged_document_is_412() {
    let (store, ctl, _) = setup();
    store
        .bulk_write(
            &ns(),
            vec![WriteModel::InsertOne {
                document: json!({"_id": "p1", "v": 1}),
            }],
        )
        .await
        .unwrap();

    let stale = ObjectId::new().to_hex();
    let result = ctl
        .write(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                expected_etag: Some(&stale),
                check_required: true,
                write_filter: None,
            },
            Mutation::Replace(json!({"v": 2})),
        )
        .await;
    assert_eq!(result.http_code, 412);
    let (doc, etag) = ctl.read(&ns(), &json!("p1"), None).await.unwrap().unwrap();
    assert_eq!(doc["v"], json!(1));
    assert_eq!(etag, None);

    let unguarded = ctl
        .write(&ns(), &json!("p1"), &open(), Mutation::Replace(json!({"v": 3})))
        .await;
    assert_eq!(unguarded.http_code, 200);
}

#[tokio::test]
async fn insert_on_existing_id_is_conflict() {
    let (_, ctl, _) = setup();
    ctl.write(&ns(), &json!("p1"), &open(), Mutation::Insert(json!({})))
        .await;
    let result = ctl
        .write(&ns(), &json!("p1"), &open(), Mutation::Insert(json!({})))
        .await;
    assert_eq!(result.http_code, 409);
    assert_eq!(result.cause.unwrap().code, codes::STORAGE_CONFLICT);
}

#[tokio::test]
async fn bad_update_maps_native_code() {
    let (_, ctl, _) = setup();
    ctl.write(&ns(), &json!("p1"), &open(), Mutation::Insert(json!({})))
        .await;
    let result = ctl
        .write(
            &ns(),
            &json!("p1"),
            &open(),
            Mutation::Update(json!({"$set": {"a.": 1}})),
        )
        .await;
    assert_eq!(result.http_code, 400);
    let cause = result.cause.unwrap();
    assert_eq!(cause.native_code(), Some(56));
    assert_eq!(cause.message_user, "FieldPath must not end with a '.'");
}

#[tokio::test]
async fn delete_outcomes() {
    let (_, ctl, _) = setup();
    assert_eq!(ctl.delete(&ns(), &json!("nope"), &open()).await.http_code, 404);
    ctl.write(&ns(), &json!("p1"), &open(), Mutation::Insert(json!({})))
        .await;
    let missing = ctl
        .delete(
            &ns(),
            &json!("p1"),
            &WriteConditions {
                check_required: true,
                ..open()
            },
        )
        .await;
    assert_eq!(missing.http_code, 409);
    assert_eq!(ctl.delete(&ns(), &json!("p1"), &open()).await.http_code, 204);
}

#[tokio::test]
async fn read_filter_hides_documents() {
    let (_, ctl, _) = setup();
    ctl.write(
        &ns(),
        &json!("p1"),
        &open(),
        Mutation::Insert(json!({"author": "bob"})),
    )
    .await;
    let filter = json!({"author": "alice"});
    assert!(ctl
        .read(&ns(), &json!("p1"), Some(&filter))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn collection_properties_guard_drop() {
    let (store, ctl, _) = setup();
    let created = ctl
        .write_collection_properties(
            "blog",
            "posts",
            &open(),
            Mutation::Replace(json!({"etagPolicy": "REQUIRED"})),
        )
        .await;
    assert_eq!(created.http_code, 201);
    assert!(store
        .list_collections("blog")
        .await
        .unwrap()
        .contains(&"posts".to_string()));
    let props = ctl.collection_properties("blog", "posts").await.unwrap();
    assert_eq!(
        policy_property(props.as_ref(), "etagPolicy"),
        Some(EtagPolicy::Required)
    );

    let refused = ctl
        .drop_collection(
            "blog",
            "posts",
            &WriteConditions {
                check_required: true,
                ..open()
            },
        )
        .await;
    assert_eq!(refused.http_code, 409);

    let etag = created.etag.unwrap();
    let dropped = ctl
        .drop_collection(
            "blog",
            "posts",
            &WriteConditions {
                expected_etag: Some(&etag),
                check_required: true,
                write_filter: None,
            },
        )
        .await;
    assert_eq!(dropped.http_code, 204);
}

const NONE: &[String] = &[];

fn policy(id_type: DocIdType) -> BulkPolicy<'static> {
    BulkPolicy {
        id_type,
        reserved_ids: NONE,
        reserved_prefixes: NONE,
        write_filter: None,
    }
}

#[tokio::test]
async fn bulk_post_mixed_success_and_failure() {
    let (_, ctl, bulk) = setup();
    ctl.write(
        &ns(),
        &json!("taken"),
        &open(),
        Mutation::Insert(json!({"author": "bob"})),
    )
    .await;
    let write_filter = json!({"author": "alice"});
    let policy = BulkPolicy {
        write_filter: Some(&write_filter),
        ..policy(DocIdType::StringOid)
    };
    let result = bulk
        .bulk_write(
            &ns(),
            "/blog/posts",
            vec![
                json!({"author": "alice"}),
                json!({"_id": "taken", "author": "alice"}),
                json!({"_id": "fresh", "author": "alice"}),
            ],
            &policy,
        )
        .await;

    assert_eq!(result.http_code, 201);
    assert_eq!(result.inserted, 2);
    assert_eq!(result.links.len(), 2);
    assert_eq!(result.links[1], "/blog/posts/fresh");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);
    assert_eq!(result.errors[0].http_status, 409);
    assert_eq!(result.errors[0].native_code, Some(11000));
    assert!(result.etag.is_some());
}

#[tokio::test]
async fn bulk_post_preflight_makes_no_store_call() {
    let (store, _, bulk) = setup();
    let result = bulk
        .bulk_write(
            &ns(),
            "/blog/posts",
            vec![json!({"_id": 1}), json!({"x": 1})],
            &policy(DocIdType::Number),
        )
        .await;
    assert_eq!(result.http_code, 400);
    assert!(result.cause.is_some());
    assert!(store.list_databases().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_batch_is_all_zeros() {
    let (_, _, bulk) = setup();
    let result = bulk
        .bulk_write(&ns(), "/blog/posts", Vec::new(), &policy(DocIdType::StringOid))
        .await;
    assert_eq!(result.http_code, 200);
    assert_eq!(
        result.representation(),
        json!({"inserted": 0, "deleted": 0, "modified": 0, "matched": 0, "links": [], "errors": []})
    );
}

#[tokio::test]
async fn bulk_patch_and_delete_need_a_filter() {
    let (_, _, bulk) = setup();
    let update = json!({"$set": {"x": 1}});
    assert_eq!(bulk.bulk_update(&ns(), None, &update, None).await.http_code, 400);
    assert_eq!(bulk.bulk_delete(&ns(), None, None).await.http_code, 400);
}

#[tokio::test]
async fn bulk_patch_and_delete_by_filter() {
    let (_, _, bulk) = setup();
    let docs: Vec<Value> = (0..4).map(|n| json!({"_id": n.to_string(), "n": n})).collect();
    bulk.bulk_write(&ns(), "/blog/posts", docs, &policy(DocIdType::StringOid))
        .await;

    let filter = json!({"n": {"$gte": 2}});
    let patched = bulk
        .bulk_update(&ns(), Some(&filter), &json!({"flag": true}), None)
        .await;
    assert_eq!(patched.http_code, 200);
    assert_eq!((patched.matched, patched.modified), (2, 2));

    let deleted = bulk
        .bulk_delete(&ns(), Some(&json!({"flag": true})), None)
        .await;
    assert_eq!(deleted.http_code, 200);
    assert_eq!(deleted.deleted, 2);

    let bad = bulk
        .bulk_delete(&ns(), Some(&json!({"n": {"$near": 1}})), None)
        .await;
    assert_eq!(bad.http_code, 400);
    assert_eq!(bad.errors[0].native_code, Some(2));
}
