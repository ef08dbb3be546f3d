use crate::{kind::ErrorKind, severity::Severity};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match REGISTRY.get_key_value(s.as_str()) {
            Some((key, _)) => Ok(ErrorCode(*key)),
            None => Err(serde::de::Error::custom(format!("unknown error code: {s}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CodeSpec {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub http_status: u16,
    pub severity: Severity,
    pub default_user_msg: &'static str,
}

pub mod codes {
    use super::ErrorCode;

    pub const AUTH_UNAUTHENTICATED: ErrorCode = ErrorCode("AUTH.UNAUTHENTICATED");
    pub const AUTH_FORBIDDEN: ErrorCode = ErrorCode("AUTH.FORBIDDEN");
    pub const REQUEST_MALFORMED_QUERY: ErrorCode = ErrorCode("REQUEST.MALFORMED_QUERY");
    pub const REQUEST_INVALID_BODY: ErrorCode = ErrorCode("REQUEST.INVALID_BODY");
    pub const REQUEST_NOT_IMPLEMENTED: ErrorCode = ErrorCode("REQUEST.NOT_IMPLEMENTED");
    pub const ID_RESERVED: ErrorCode = ErrorCode("ID.RESERVED");
    pub const ID_TYPE_MISMATCH: ErrorCode = ErrorCode("ID.TYPE_MISMATCH");
    pub const ETAG_REQUIRED: ErrorCode = ErrorCode("ETAG.REQUIRED");
    pub const ETAG_MISMATCH: ErrorCode = ErrorCode("ETAG.MISMATCH");
    pub const STORAGE_NOT_FOUND: ErrorCode = ErrorCode("STORAGE.NOT_FOUND");
    pub const STORAGE_CONFLICT: ErrorCode = ErrorCode("STORAGE.CONFLICT");
    pub const STORAGE_NATIVE: ErrorCode = ErrorCode("STORAGE.NATIVE");
    pub const CONFIG_INVALID: ErrorCode = ErrorCode("CONFIG.INVALID");
    pub const UNKNOWN_INTERNAL: ErrorCode = ErrorCode("UNKNOWN.INTERNAL");
}

pub static REGISTRY: Lazy<HashMap<&'static str, CodeSpec>> = Lazy::new(|| {
    use codes::*;

    let mut map = HashMap::new();
    let mut add = |spec: CodeSpec| {
        let key = spec.code.0;
        let previous = map.insert(key, spec);
        debug_assert!(previous.is_none(), "duplicate error code: {key}");
    };

    add(CodeSpec {
        code: AUTH_UNAUTHENTICATED,
        kind: ErrorKind::Auth,
        http_status: 401,
        severity: Severity::Warn,
        default_user_msg: "Authentication required.",
    });

    add(CodeSpec {
        code: AUTH_FORBIDDEN,
        kind: ErrorKind::PolicyDeny,
        http_status: 403,
        severity: Severity::Warn,
        default_user_msg: "You don't have permission to perform this action.",
    });

    add(CodeSpec {
        code: REQUEST_MALFORMED_QUERY,
        kind: ErrorKind::Request,
        http_status: 400,
        severity: Severity::Info,
        default_user_msg: "Invalid query parameter.",
    });

    add(CodeSpec {
        code: REQUEST_INVALID_BODY,
        kind: ErrorKind::Request,
        http_status: 400,
        severity: Severity::Info,
        default_user_msg: "Invalid request content.",
    });

    add(CodeSpec {
        code: REQUEST_NOT_IMPLEMENTED,
        kind: ErrorKind::Request,
        http_status: 501,
        severity: Severity::Info,
        default_user_msg: "Method not implemented for this resource.",
    });

    add(CodeSpec {
        code: ID_RESERVED,
        kind: ErrorKind::Identifier,
        http_status: 403,
        severity: Severity::Warn,
        default_user_msg: "The document id is reserved.",
    });

    add(CodeSpec {
        code: ID_TYPE_MISMATCH,
        kind: ErrorKind::Identifier,
        http_status: 400,
        severity: Severity::Info,
        default_user_msg: "The document id does not match the id type policy.",
    });

    add(CodeSpec {
        code: ETAG_REQUIRED,
        kind: ErrorKind::Conflict,
        http_status: 409,
        severity: Severity::Info,
        default_user_msg: "The ETag must be provided using the 'If-Match' header.",
    });

    add(CodeSpec {
        code: ETAG_MISMATCH,
        kind: ErrorKind::Precondition,
        http_status: 412,
        severity: Severity::Info,
        default_user_msg: "The ETag does not match the current resource version.",
    });

    add(CodeSpec {
        code: STORAGE_NOT_FOUND,
        kind: ErrorKind::NotFound,
        http_status: 404,
        severity: Severity::Info,
        default_user_msg: "Resource not found.",
    });

    add(CodeSpec {
        code: STORAGE_CONFLICT,
        kind: ErrorKind::Conflict,
        http_status: 409,
        severity: Severity::Warn,
        default_user_msg: "The resource already exists.",
    });

    add(CodeSpec {
        code: STORAGE_NATIVE,
        kind: ErrorKind::Storage,
        http_status: 500,
        severity: Severity::Error,
        default_user_msg: "Error handling the request, see log for more information.",
    });

    add(CodeSpec {
        code: CONFIG_INVALID,
        kind: ErrorKind::Config,
        http_status: 500,
        severity: Severity::Error,
        default_user_msg: "Invalid configuration.",
    });

    add(CodeSpec {
        code: UNKNOWN_INTERNAL,
        kind: ErrorKind::Unknown,
        http_status: 500,
        severity: Severity::Critical,
        default_user_msg: "Internal error. Please retry later.",
    });

    map
});

/// Looks up the registered spec. Unregistered codes fall back to
/// `UNKNOWN.INTERNAL`.
pub fn spec_of(code: ErrorCode) -> &'static CodeSpec {
    match REGISTRY.get(code.0) {
        Some(spec) => spec,
        None => &REGISTRY[codes::UNKNOWN_INTERNAL.0],
    }
}
