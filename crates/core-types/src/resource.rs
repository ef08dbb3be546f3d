use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::TypesError;

/// Document id segment addressing every document of a collection.
pub const BULK_WILDCARD: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Other,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Other => "OTHER",
        }
    }

    pub const fn is_write(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "HEAD" => Method::Head,
            _ => Method::Other,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Root,
    Database,
    Collection,
    Document,
    BulkDocuments,
    Invalid,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Root => "ROOT",
            ResourceType::Database => "DB",
            ResourceType::Collection => "COLLECTION",
            ResourceType::Document => "DOCUMENT",
            ResourceType::BulkDocuments => "BULK_DOCUMENTS",
            ResourceType::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded `/db/coll/doc` address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePath {
    pub db: Option<String>,
    pub collection: Option<String>,
    pub document: Option<String>,
    #[serde(skip)]
    extra_segments: bool,
}

impl ResourcePath {
    pub fn parse(path: &str) -> Result<Self, TypesError> {
        let mut segments = Vec::new();
        for raw in path.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| TypesError::InvalidPath(path.to_string()))?;
            segments.push(decoded.into_owned());
        }
        let extra_segments = segments.len() > 3;
        let mut it = segments.into_iter();
        Ok(Self {
            db: it.next(),
            collection: it.next(),
            document: it.next(),
            extra_segments,
        })
    }

    pub fn database(db: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            ..Self::default()
        }
    }

    pub fn collection(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            collection: Some(coll.into()),
            ..Self::default()
        }
    }

    pub fn document(db: impl Into<String>, coll: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            collection: Some(coll.into()),
            document: Some(doc.into()),
            extra_segments: false,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        if self.extra_segments {
            return ResourceType::Invalid;
        }
        let reserved = |name: &Option<String>| name.as_deref().is_some_and(|n| n.starts_with('_'));
        if reserved(&self.db) || reserved(&self.collection) {
            return ResourceType::Invalid;
        }
        match (&self.db, &self.collection, &self.document) {
            (None, _, _) => ResourceType::Root,
            (Some(_), None, _) => ResourceType::Database,
            (Some(_), Some(_), None) => ResourceType::Collection,
            (Some(_), Some(_), Some(doc)) if doc == BULK_WILDCARD => ResourceType::BulkDocuments,
            (Some(_), Some(_), Some(_)) => ResourceType::Document,
        }
    }

    /// `/db/coll` form of this path, used to build document links.
    pub fn collection_path(&self) -> String {
        match (&self.db, &self.collection) {
            (Some(db), Some(coll)) => format!("/{db}/{coll}"),
            (Some(db), None) => format!("/{db}"),
            _ => "/".to_string(),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<&str> = [&self.db, &self.collection, &self.document]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect();
        write!(f, "/{}", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_resource_types() {
        let cases = [
            ("/", ResourceType::Root),
            ("/db", ResourceType::Database),
            ("/db/coll/", ResourceType::Collection),
            ("/db/coll/doc", ResourceType::Document),
            ("/db/coll/*", ResourceType::BulkDocuments),
            ("/db/coll/doc/extra", ResourceType::Invalid),
            ("/db/_properties", ResourceType::Invalid),
        ];
        for (path, expected) in cases {
            assert_eq!(ResourcePath::parse(path).unwrap().resource_type(), expected, "{path}");
        }
    }

    #[test]
    fn decodes_percent_encoded_segments() {
        let path = ResourcePath::parse("/db/coll/my%20doc").unwrap();
        assert_eq!(path.document.as_deref(), Some("my doc"));
        assert_eq!(path.collection_path(), "/db/coll");
        assert_eq!(path.to_string(), "/db/coll/my doc");
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!("TRACE".parse::<Method>().unwrap(), Method::Other);
        assert!(Method::Delete.is_write());
        assert!(!Method::Get.is_write());
    }
}
