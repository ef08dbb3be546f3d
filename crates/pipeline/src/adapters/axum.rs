//! axum front end: converts transport requests into [`GatewayRequest`]s and
//! renders the [`GatewayResponse`] the chain produced.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use docgate_core_types::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::errors::{to_http_response, PipelineError};
use crate::exchange::{GatewayRequest, GatewayResponse};

pub const HEALTH_PATH: &str = "/_health";

/// `/_health` plus a fallback that hands everything else to the dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(handle)
        .with_state(dispatcher)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn handle(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    let limit = dispatcher.context().settings.max_body_bytes;
    match into_gateway_request(request, limit).await {
        Ok(request) => render(dispatcher.dispatch(request).await),
        Err(err) => {
            let (status, body) = to_http_response(&err);
            let mut response = GatewayResponse::new(status);
            response.body = Some(body);
            render(response)
        }
    }
}

async fn into_gateway_request(
    request: Request<Body>,
    limit: usize,
) -> Result<GatewayRequest, PipelineError> {
    let (parts, body) = request.into_parts();
    let method = Method::from_str(parts.method.as_str()).unwrap_or(Method::Other);
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let bytes = to_bytes(body, limit).await.map_err(|e| {
        debug!(error = %e, limit, "request body rejected");
        PipelineError::payload_too_large(limit)
    })?;
    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| PipelineError::invalid_body(format!("invalid json: {e}")))?,
        )
    };

    let mut gateway = GatewayRequest::new(method, parts.uri.path());
    gateway.query = parts.uri.query().unwrap_or_default().to_string();
    gateway.headers = parts.headers;
    gateway.body = body;
    gateway.remote_addr = remote_addr;
    Ok(gateway)
}

fn render(response: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = match (&response.body, status) {
        (_, StatusCode::NOT_MODIFIED) | (None, _) => Vec::new(),
        (Some(body), _) => serde_json::to_vec(body).unwrap_or_default(),
    };
    let has_body = !bytes.is_empty();
    let mut rendered = Response::new(Body::from(bytes));
    *rendered.status_mut() = status;
    *rendered.headers_mut() = response.headers;
    if has_body {
        rendered.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_body_and_query() {
        let request = Request::builder()
            .method("POST")
            .uri("/db/coll?page=2")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        let gateway = into_gateway_request(request, 1024).await.unwrap();
        assert_eq!(gateway.method, Method::Post);
        assert_eq!(gateway.path, "/db/coll");
        assert_eq!(gateway.query, "page=2");
        assert_eq!(gateway.body, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn rejects_invalid_json_and_oversized_bodies() {
        let request = Request::builder()
            .method("PUT")
            .uri("/db")
            .body(Body::from("{nope"))
            .unwrap();
        let err = into_gateway_request(request, 1024).await.unwrap_err();
        assert_eq!(err.0.http_status, 400);

        let request = Request::builder()
            .method("PUT")
            .uri("/db")
            .body(Body::from(vec![b' '; 64]))
            .unwrap();
        let err = into_gateway_request(request, 8).await.unwrap_err();
        assert_eq!(err.0.http_status, 413);
    }
}
