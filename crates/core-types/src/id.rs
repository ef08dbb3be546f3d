use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ObjectId, TypesError};

/// Policy deciding how a path segment becomes an `_id` and which `_id`
/// values a write may carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocIdType {
    Oid,
    #[default]
    StringOid,
    String,
    Number,
}

impl DocIdType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DocIdType::Oid => "OID",
            DocIdType::StringOid => "STRING_OID",
            DocIdType::String => "STRING",
            DocIdType::Number => "NUMBER",
        }
    }

    /// Whether missing ids can be generated server side.
    pub const fn can_generate(self) -> bool {
        matches!(self, DocIdType::Oid | DocIdType::StringOid)
    }

    /// Converts a raw path segment into an `_id` value.
    pub fn id_from_path(self, raw: &str) -> Result<Value, TypesError> {
        let invalid = || TypesError::IdNotValidForType {
            id: raw.to_string(),
            id_type: self.as_str().to_string(),
        };
        match self {
            DocIdType::Oid => raw
                .parse::<ObjectId>()
                .map(|oid| oid.to_json())
                .map_err(|_| invalid()),
            DocIdType::StringOid => Ok(match raw.parse::<ObjectId>() {
                Ok(oid) => oid.to_json(),
                Err(_) => Value::String(raw.to_string()),
            }),
            DocIdType::String => Ok(Value::String(raw.to_string())),
            DocIdType::Number => {
                if let Ok(int) = raw.parse::<i64>() {
                    Ok(Value::from(int))
                } else {
                    raw.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(invalid)
                }
            }
        }
    }

    /// Whether an `_id` carried in a body is acceptable under this policy.
    pub fn accepts(self, id: &Value) -> bool {
        match self {
            DocIdType::Oid => ObjectId::from_json(id).is_some(),
            DocIdType::StringOid => ObjectId::from_json(id).is_some() || id.is_string(),
            DocIdType::String => id.is_string(),
            DocIdType::Number => id.is_number(),
        }
    }

    /// Policy that addresses `id` in a URL: ObjectIds and strings need no
    /// qualifier, numbers need `NUMBER`, and strings that look like an
    /// ObjectId need `STRING`.
    pub fn for_link(id: &Value) -> DocIdType {
        match id {
            Value::String(s) if ObjectId::is_valid(s) => DocIdType::String,
            Value::Number(_) => DocIdType::Number,
            _ => DocIdType::StringOid,
        }
    }
}

/// Path segment for an `_id` value, or `None` when the value cannot address
/// a document in a URL.
pub fn id_to_path_segment(id: &Value) -> Option<String> {
    if let Some(oid) = ObjectId::from_json(id) {
        return Some(oid.to_hex());
    }
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl fmt::Display for DocIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocIdType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OID" | "OBJECTID" => Ok(DocIdType::Oid),
            "STRING_OID" => Ok(DocIdType::StringOid),
            "STRING" => Ok(DocIdType::String),
            "NUMBER" => Ok(DocIdType::Number),
            other => Err(TypesError::InvalidIdType(other.to_string())),
        }
    }
}
