use std::str::FromStr;
use std::time::Instant;

use docgate_acl::BindingContext;
use docgate_core_types::{Account, DocIdType, Method, QueryParams, ResourcePath, ResourceType};
use docgate_errors::prelude::ErrorObj;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

/// Transport-neutral inbound request.
#[derive(Clone, Debug)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub remote_addr: Option<String>,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: None,
            remote_addr: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response assembled by the chain; only the adapter turns it into bytes.
#[derive(Clone, Debug)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl GatewayResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn insert_header(&mut self, name: &str, value: &str) {
        insert_header(&mut self.headers, name, value);
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
        headers.insert(name, value);
    }
}

/// Query parameters after validation by the query stage.
#[derive(Clone, Debug)]
pub struct ParsedQuery {
    pub filter: Option<Value>,
    pub sort: Option<Value>,
    pub keys: Option<Value>,
    pub page: usize,
    pub pagesize: usize,
    pub id_type: DocIdType,
    pub check_etag: bool,
}

impl Default for ParsedQuery {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            keys: None,
            page: 1,
            pagesize: 100,
            id_type: DocIdType::default(),
            check_etag: false,
        }
    }
}

impl ParsedQuery {
    pub fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.pagesize)
    }
}

/// Per-request mutable context handed to every stage.
pub struct Exchange {
    pub request: GatewayRequest,
    pub resource: ResourcePath,
    pub resource_type: ResourceType,
    pub request_id: String,
    pub started: Instant,
    pub account: Option<Account>,
    pub query: QueryParams,
    pub parsed: ParsedQuery,
    pub content: Option<Value>,
    pub bindings: Option<BindingContext>,
    pub read_filter: Option<Value>,
    pub write_filter: Option<Value>,
    pub merge_request: Option<Value>,
    pub etag_check_required: bool,
    pub etag: Option<String>,
    pub response: GatewayResponse,
    error: Option<ErrorObj>,
}

impl Exchange {
    pub fn new(request: GatewayRequest) -> Self {
        let (resource, resource_type) = match ResourcePath::parse(&request.path) {
            Ok(path) => {
                let rt = path.resource_type();
                (path, rt)
            }
            Err(err) => {
                debug!(path = %request.path, error = %err, "undecodable resource path");
                (ResourcePath::default(), ResourceType::Invalid)
            }
        };
        let query = QueryParams::parse(&request.query);
        let content = request.body.clone();
        Self {
            request,
            resource,
            resource_type,
            request_id: String::new(),
            started: Instant::now(),
            account: None,
            query,
            parsed: ParsedQuery::default(),
            content,
            bindings: None,
            read_filter: None,
            write_filter: None,
            merge_request: None,
            etag_check_required: false,
            etag: None,
            response: GatewayResponse::new(200),
            error: None,
        }
    }

    pub fn method(&self) -> Method {
        self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Marks the exchange failed. Later stages skip their work unless they
    /// observe errors.
    pub fn set_error(&mut self, err: impl Into<ErrorObj>) {
        let err = err.into();
        debug!(
            request_id = %self.request_id,
            code = err.code.0,
            status = err.http_status,
            "exchange in error"
        );
        self.response.status = err.http_status;
        self.error = Some(err);
    }

    pub fn error(&self) -> Option<&ErrorObj> {
        self.error.as_ref()
    }

    pub fn in_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    pub fn set_body(&mut self, body: Value) {
        self.response.body = Some(body);
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.response.insert_header(name, value);
    }

    /// Etag sent in `If-Match`, without surrounding quotes.
    pub fn if_match(&self) -> Option<&str> {
        self.header("If-Match").map(unquote).filter(|v| !v.is_empty())
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.header("If-None-Match").map(unquote).filter(|v| !v.is_empty())
    }

    /// Name of the authenticated account, if any.
    pub fn account_name(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.name.as_str())
    }

    /// `_id` addressed by the document segment of the path.
    pub fn document_id(&self) -> Option<Result<Value, docgate_core_types::TypesError>> {
        self.resource
            .document
            .as_deref()
            .map(|raw| self.parsed.id_type.id_from_path(raw))
    }

    pub fn into_response(self) -> GatewayResponse {
        self.response
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
