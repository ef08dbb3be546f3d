use std::sync::Arc;

use async_trait::async_trait;
use docgate_acl::prelude::*;
use docgate_core_types::{Method, ResourceType};
use docgate_pipeline::prelude::*;
use docgate_pipeline::stages::{RequestInitStage, ResponseStampStage};
use docgate_storage::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const RULES: &str = r#"
permissions:
  - roles: [admin]
    predicate: "path-prefix('/')"
  - roles: [user]
    predicate: "path-prefix('/blog')"
    readFilter: { author: "@user.name" }
    writeFilter: { author: "@user.name" }
    mergeRequest: { author: "@user.name" }
  - roles: ["$unauthenticated"]
    predicate: "path-prefix('/public') and method(GET)"
"#;

fn realm() -> FileRealm {
    FileRealm::new([
        UserSpec {
            name: "root".into(),
            password: "pw".into(),
            roles: vec!["admin".into()],
            properties: None,
        },
        UserSpec {
            name: "alice".into(),
            password: "pw".into(),
            roles: vec!["user".into()],
            properties: None,
        },
        UserSpec {
            name: "bob".into(),
            password: "pw".into(),
            roles: vec!["user".into()],
            properties: None,
        },
    ])
}

fn context() -> GatewayContext {
    let file = parse_acl_yaml(RULES).unwrap();
    let registry = AclRegistry::compile(&file, Arc::new(PredicateParser::new())).unwrap();
    GatewayContext::new(
        Arc::new(MemoryStore::new()),
        Arc::new(AclStore::new(Arc::new(registry))),
        Arc::new(realm()),
        PipelineSettings::default(),
    )
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(context()))
}

fn as_user(user: &str, method: Method, path: &str) -> GatewayRequest {
    GatewayRequest::new(method, path).with_header("Authorization", &basic_header(user, "pw"))
}

fn message(response: &GatewayResponse) -> Value {
    response.body.as_ref().unwrap()["message"].clone()
}

#[tokio::test]
async fn anonymous_denial_is_401_with_challenge() {
    let d = dispatcher();
    let response = d.dispatch(GatewayRequest::new(Method::Get, "/blog")).await;
    assert_eq!(response.status, 401);
    assert_eq!(
        response.header("WWW-Authenticate"),
        Some("Basic realm=\"docgate\"")
    );
    assert!(response.header("X-Request-Id").is_some());
    assert_eq!(response.body.as_ref().unwrap()["http status code"], json!(401));
}

#[tokio::test]
async fn wrong_password_is_401() {
    let d = dispatcher();
    let request = GatewayRequest::new(Method::Get, "/blog")
        .with_header("Authorization", &basic_header("alice", "wrong"));
    let response = d.dispatch(request).await;
    assert_eq!(response.status, 401);
    assert!(response.header("WWW-Authenticate").is_some());
}

#[tokio::test]
async fn authenticated_denial_is_403() {
    let d = dispatcher();
    let response = d.dispatch(as_user("bob", Method::Get, "/secret")).await;
    assert_eq!(response.status, 403);
    assert!(response.header("WWW-Authenticate").is_none());
}

#[tokio::test]
async fn anonymous_allowed_read_reaches_the_store() {
    let d = dispatcher();
    let response = d
        .dispatch(GatewayRequest::new(Method::Get, "/public/news"))
        .await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn request_id_is_propagated() {
    let d = dispatcher();
    let response = d
        .dispatch(GatewayRequest::new(Method::Get, "/").with_header("X-Request-Id", "req-42"))
        .await;
    assert_eq!(response.header("X-Request-Id"), Some("req-42"));
}

#[tokio::test]
async fn unknown_combinations_are_not_implemented() {
    let d = dispatcher();
    assert_eq!(
        d.dispatch(as_user("root", Method::Post, "/db")).await.status,
        501
    );
    assert_eq!(
        d.dispatch(as_user("root", Method::Put, "/db/coll/*")).await.status,
        501
    );
    assert_eq!(
        d.dispatch(as_user("root", Method::Get, "/db/_properties"))
            .await
            .status,
        403
    );
}

#[tokio::test]
async fn document_lifecycle_with_etags() {
    let d = dispatcher();
    let created = d
        .dispatch(as_user("root", Method::Put, "/db/coll/doc1").with_body(json!({"v": 1})))
        .await;
    assert_eq!(created.status, 201);
    let etag = created.header("ETag").unwrap().to_string();

    let read = d.dispatch(as_user("root", Method::Get, "/db/coll/doc1")).await;
    assert_eq!(read.status, 200);
    assert_eq!(read.header("ETag"), Some(etag.as_str()));
    assert_eq!(read.body.as_ref().unwrap()["v"], json!(1));

    let cached = d
        .dispatch(as_user("root", Method::Get, "/db/coll/doc1").with_header("If-None-Match", &etag))
        .await;
    assert_eq!(cached.status, 304);
    assert!(cached.body.is_none());

    let stale = d
        .dispatch(
            as_user("root", Method::Put, "/db/coll/doc1")
                .with_header("If-Match", "65f0a1b2c3d4e5f601234567")
                .with_body(json!({"v": 2})),
        )
        .await;
    assert_eq!(stale.status, 412);
    assert_eq!(stale.header("ETag"), Some(etag.as_str()));

    let updated = d
        .dispatch(
            as_user("root", Method::Patch, "/db/coll/doc1")
                .with_header("If-Match", &etag)
                .with_body(json!({"v": 3})),
        )
        .await;
    assert_eq!(updated.status, 200);
    assert_ne!(updated.header("ETag"), Some(etag.as_str()));

    let deleted = d
        .dispatch(as_user("root", Method::Delete, "/db/coll/doc1"))
        .await;
    assert_eq!(deleted.status, 204);
    let gone = d.dispatch(as_user("root", Method::Get, "/db/coll/doc1")).await;
    assert_eq!(gone.status, 404);
}

#[tokio::test]
async fn collection_property_requires_document_etags() {
    let d = dispatcher();
    let props = d
        .dispatch(
            as_user("root", Method::Put, "/db/coll").with_body(json!({"etagDocPolicy": "REQUIRED"})),
        )
        .await;
    assert_eq!(props.status, 201);

    let created = d
        .dispatch(as_user("root", Method::Put, "/db/coll/d").with_body(json!({"a": 1})))
        .await;
    assert_eq!(created.status, 201);

    let refused = d
        .dispatch(as_user("root", Method::Put, "/db/coll/d").with_body(json!({"a": 2})))
        .await;
    assert_eq!(refused.status, 409);
    assert_eq!(
        message(&refused),
        json!("The ETag must be provided using the 'If-Match' header.")
    );

    let db = d.dispatch(as_user("root", Method::Get, "/db")).await;
    assert_eq!(db.status, 200);
    assert_eq!(db.body.as_ref().unwrap()["collections"], json!(["coll"]));
}

#[tokio::test]
async fn dropping_a_collection_needs_its_etag() {
    let d = dispatcher();
    let created = d
        .dispatch(as_user("root", Method::Put, "/db/coll").with_body(json!({})))
        .await;
    let etag = created.header("ETag").unwrap().to_string();

    let refused = d.dispatch(as_user("root", Method::Delete, "/db/coll")).await;
    assert_eq!(refused.status, 409);

    let dropped = d
        .dispatch(as_user("root", Method::Delete, "/db/coll").with_header("If-Match", &etag))
        .await;
    assert_eq!(dropped.status, 204);
}

#[tokio::test]
async fn acl_filters_scope_documents_to_their_author() {
    let d = dispatcher();
    let posted = d
        .dispatch(as_user("alice", Method::Post, "/blog/posts").with_body(json!({"title": "hi"})))
        .await;
    assert_eq!(posted.status, 201);
    let location = posted.header("Location").unwrap().to_string();
    assert!(location.starts_with("/blog/posts/"));

    let own = d.dispatch(as_user("alice", Method::Get, &location)).await;
    assert_eq!(own.status, 200);
    assert_eq!(own.body.as_ref().unwrap()["author"], json!("alice"));

    let foreign = d.dispatch(as_user("bob", Method::Get, &location)).await;
    assert_eq!(foreign.status, 404);

    let listing = d.dispatch(as_user("bob", Method::Get, "/blog/posts")).await;
    assert_eq!(listing.status, 200);
    assert_eq!(listing.body, Some(json!([])));

    let hijack = d
        .dispatch(as_user("bob", Method::Put, &location).with_body(json!({"title": "mine"})))
        .await;
    assert_eq!(hijack.status, 409);
}

#[tokio::test]
async fn bulk_post_patch_and_delete() {
    let d = dispatcher();
    let posted = d
        .dispatch(
            as_user("root", Method::Post, "/db/coll")
                .with_body(json!([{"_id": "a", "n": 1}, {"_id": "b", "n": 2}, {"n": 3}])),
        )
        .await;
    assert_eq!(posted.status, 201);
    let body = posted.body.unwrap();
    assert_eq!(body["inserted"], json!(3));
    assert_eq!(body["links"][0], json!("/db/coll/a"));
    assert!(posted.headers.contains_key("ETag"));

    let unfiltered = d
        .dispatch(as_user("root", Method::Patch, "/db/coll/*").with_body(json!({"flag": true})))
        .await;
    assert_eq!(unfiltered.status, 400);

    let patched = d
        .dispatch(
            as_user("root", Method::Patch, "/db/coll/*")
                .with_query("filter=%7B%22n%22%3A%7B%22%24gte%22%3A2%7D%7D")
                .with_body(json!({"flag": true})),
        )
        .await;
    assert_eq!(patched.status, 200);
    assert_eq!(patched.body.as_ref().unwrap()["modified"], json!(2));

    let deleted = d
        .dispatch(
            as_user("root", Method::Delete, "/db/coll/*")
                .with_query("filter=%7B%22flag%22%3Atrue%7D"),
        )
        .await;
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.body.as_ref().unwrap()["deleted"], json!(2));

    let page = d
        .dispatch(as_user("root", Method::Get, "/db/coll").with_query("sort=-n&pagesize=10"))
        .await;
    assert_eq!(page.body.as_ref().unwrap().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn content_checks() {
    let d = dispatcher();
    let not_object = d
        .dispatch(as_user("root", Method::Put, "/db/coll/d").with_body(json!([1])))
        .await;
    assert_eq!(not_object.status, 400);

    let other_id = d
        .dispatch(as_user("root", Method::Put, "/db/coll/d").with_body(json!({"_id": "e"})))
        .await;
    assert_eq!(other_id.status, 400);

    let reserved = d
        .dispatch(as_user("root", Method::Post, "/db/coll").with_body(json!({"_id": "_properties"})))
        .await;
    assert_eq!(reserved.status, 403);

    let bad_item = d
        .dispatch(as_user("root", Method::Post, "/db/coll").with_body(json!([{"a": 1}, 2])))
        .await;
    assert_eq!(bad_item.status, 400);
}

#[tokio::test]
async fn query_errors_are_400() {
    let d = dispatcher();
    let response = d
        .dispatch(as_user("root", Method::Get, "/db/coll").with_query("page=0"))
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(
        response.body.as_ref().unwrap()["code"],
        json!("REQUEST.MALFORMED_QUERY")
    );
}

struct Boom;

#[async_trait]
impl Stage for Boom {
    fn name(&self) -> &'static str {
        "boom"
    }

    async fn handle(&self, _ex: &mut Exchange) -> Result<(), PipelineError> {
        panic!("stage exploded");
    }
}

struct Fails;

#[async_trait]
impl Stage for Fails {
    fn name(&self) -> &'static str {
        "fails"
    }

    async fn handle(&self, _ex: &mut Exchange) -> Result<(), PipelineError> {
        Err(PipelineError::forbidden("should not leak"))
    }
}

#[tokio::test]
async fn panics_and_unexpected_errors_become_500() {
    let mut d = dispatcher();
    d.insert_chain(
        ResourceType::Root,
        Method::Get,
        PipelinedChain::new(vec![Arc::new(RequestInitStage), Arc::new(Boom)]),
    );
    d.insert_chain(
        ResourceType::Database,
        Method::Get,
        PipelinedChain::new(vec![Arc::new(Fails), Arc::new(ResponseStampStage)]),
    );

    let panicked = d.dispatch(GatewayRequest::new(Method::Get, "/")).await;
    assert_eq!(panicked.status, 500);
    assert!(panicked.header("X-Request-Id").is_some());

    let failed = d.dispatch(GatewayRequest::new(Method::Get, "/db")).await;
    assert_eq!(failed.status, 500);
    assert_eq!(failed.body.as_ref().unwrap()["http status code"], json!(500));
}
