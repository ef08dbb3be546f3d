use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use docgate_pipeline::adapters::axum::router as pipeline_router;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use super::state::ServeState;

pub const LIVE_PATH: &str = "/_livez";
pub const READY_PATH: &str = "/_readyz";

/// Probe routes plus the document pipeline, which owns `/_health` and every
/// other path.
pub fn build_router(state: ServeState) -> Router {
    let cors = state.app.config().server.cors;
    let health = Router::new()
        .route(LIVE_PATH, get(live_handler))
        .route(READY_PATH, get(ready_handler))
        .with_state(state.clone());
    let router = health.merge(pipeline_router(state.app.dispatcher().clone()));
    if cors {
        router.layer(cors_layer())
    } else {
        router
    }
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any)
}

async fn live_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let snapshot = state.health_snapshot();
    let status = if snapshot.live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "live": snapshot.live,
            "started_at": snapshot.started_at.to_rfc3339(),
        })),
    )
}

async fn ready_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let snapshot = state.health_snapshot();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": snapshot.ready,
            "acl_rules": snapshot.acl_rules,
            "last_reload": snapshot.last_reload.map(|t| t.to_rfc3339()),
            "last_error": snapshot.last_error,
        })),
    )
}
