use crate::model::ErrorObj;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct PublicErrorView {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorObj {
    pub fn to_public(&self) -> PublicErrorView {
        PublicErrorView {
            code: self.code.0,
            message: self.message_user.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }

    /// Response body for an errored exchange. Developer detail and meta
    /// never leave the process, except the native store code.
    pub fn to_http_body(&self) -> Value {
        let public = self.to_public();
        let mut body = json!({
            "http status code": self.http_status,
            "http status description": reason_phrase(self.http_status),
            "code": public.code,
            "message": public.message,
        });
        if let Some(native) = self.native_code() {
            body["mongodbErrorCode"] = json!(native);
        }
        if let Some(correlation) = public.correlation_id {
            body["correlation_id"] = json!(correlation);
        }
        body
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        409 => "Conflict",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
