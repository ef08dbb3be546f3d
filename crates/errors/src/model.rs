use crate::{
    code::{spec_of, ErrorCode},
    kind::ErrorKind,
    severity::Severity,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CauseEntry {
    pub code: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorObj {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_dev: Option<String>,
    pub http_status: u16,
    pub severity: Severity,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_chain: Option<Vec<CauseEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorObj {
    /// Native store code attached by the storage layer, if any.
    pub fn native_code(&self) -> Option<i64> {
        self.meta.get("native_code").and_then(Value::as_i64)
    }

    /// `CODE: message`, preferring the developer message.
    pub fn summary(&self) -> String {
        let message = self.message_dev.as_deref().unwrap_or(&self.message_user);
        format!("{}: {}", self.code.0, message)
    }
}

pub struct ErrorBuilder {
    code: ErrorCode,
    message_user: Option<String>,
    message_dev: Option<String>,
    http_status: Option<u16>,
    meta: Map<String, Value>,
    cause_chain: Vec<CauseEntry>,
    correlation_id: Option<String>,
}

impl ErrorBuilder {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message_user: None,
            message_dev: None,
            http_status: None,
            meta: Map::new(),
            cause_chain: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn user_msg(mut self, message: impl Into<String>) -> Self {
        self.message_user = Some(message.into());
        self
    }

    pub fn dev_msg(mut self, message: impl Into<String>) -> Self {
        self.message_dev = Some(message.into());
        self
    }

    /// Overrides the registered status. Used for native store errors whose
    /// status comes from the code taxonomy rather than the registry.
    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn meta_kv(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn cause(mut self, cause: CauseEntry) -> Self {
        self.cause_chain.push(cause);
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn build(self) -> ErrorObj {
        let spec = spec_of(self.code);
        ErrorObj {
            code: self.code,
            kind: spec.kind,
            message_user: self
                .message_user
                .unwrap_or_else(|| spec.default_user_msg.to_string()),
            message_dev: self.message_dev,
            http_status: self.http_status.unwrap_or(spec.http_status),
            severity: spec.severity,
            meta: self.meta,
            cause_chain: if self.cause_chain.is_empty() {
                None
            } else {
                Some(self.cause_chain)
            },
            correlation_id: self.correlation_id,
        }
    }
}
