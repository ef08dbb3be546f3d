//! Compiled request predicates.

mod custom;
mod parse;

use std::fmt;
use std::sync::Arc;

use docgate_core_types::{flatten, get_path, FlatDocument, Method, QueryParams};
use regex::Regex;
use serde_json::{Map, Value};

pub use custom::{CustomFactory, CustomPredicate};
pub use parse::{Arg, ArgValue, PredicateParseError, PredicateParser};

/// Read-only view of the request a predicate is tested against. Bulk
/// bodies produce one view per element.
#[derive(Clone, Copy, Debug)]
pub struct RequestView<'a> {
    pub method: Method,
    pub path: &'a str,
    pub user_name: Option<&'a str>,
    pub query: Option<&'a QueryParams>,
    pub document: Option<&'a DocumentView>,
}

impl<'a> RequestView<'a> {
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            user_name: None,
            query: None,
            document: None,
        }
    }

    pub fn with_user(mut self, user_name: Option<&'a str>) -> Self {
        self.user_name = user_name;
        self
    }

    pub fn with_query(mut self, query: Option<&'a QueryParams>) -> Self {
        self.query = query;
        self
    }

    pub fn with_document(mut self, document: Option<&'a DocumentView>) -> Self {
        self.document = document;
        self
    }

    pub fn query_len(&self) -> usize {
        self.query.map(QueryParams::len).unwrap_or(0)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.query.map(|q| q.contains(name)).unwrap_or(false)
    }
}

/// Request body prepared for content predicates. Update operator bodies
/// (`{"$set": {...}}`) are unwrapped so their targets are visible as
/// ordinary fields.
#[derive(Clone, Debug)]
pub struct DocumentView {
    content: Value,
    leaves: FlatDocument,
    paths: FlatDocument,
}

impl DocumentView {
    pub fn new(raw: &Value) -> Self {
        let content = unwrap_operators(raw);
        Self {
            leaves: flatten(&content, false),
            paths: flatten(&content, true),
            content,
        }
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Value at a dotted path. Falls back to a literal dotted key, which is
    /// how update operators address nested fields.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.paths
            .get(path)
            .or_else(|| get_path(&self.content, path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn leaf_paths(&self) -> impl Iterator<Item = &str> {
        self.leaves.keys().map(String::as_str)
    }

    pub fn all_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }
}

fn unwrap_operators(raw: &Value) -> Value {
    let Some(map) = raw.as_object() else {
        return raw.clone();
    };
    if !map.keys().any(|k| k.starts_with('$')) {
        return raw.clone();
    }
    let mut merged = Map::new();
    for (key, value) in map {
        match (key.starts_with('$'), value.as_object()) {
            (true, Some(targets)) => {
                for (target, v) in targets {
                    merged.insert(target.clone(), v.clone());
                }
            }
            (true, None) => {}
            (false, _) => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(merged)
}

#[derive(Clone, Debug)]
pub enum PathMatcher {
    Exact(Vec<String>),
    Prefix(Vec<String>),
    Template(Vec<String>),
    Regex(Regex),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        match self {
            PathMatcher::Exact(paths) => paths.iter().any(|p| normalize_path(p) == path),
            PathMatcher::Prefix(prefixes) => prefixes.iter().any(|p| prefix_matches(p, path)),
            PathMatcher::Template(templates) => {
                templates.iter().any(|t| template_matches(t, path))
            }
            PathMatcher::Regex(re) => re.is_match(path),
        }
    }
}

fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = normalize_path(prefix);
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn template_matches(template: &str, path: &str) -> bool {
    let expected: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut idx = 0;
    for (pos, segment) in expected.iter().enumerate() {
        if *segment == "*" && pos == expected.len() - 1 {
            return true;
        }
        let Some(candidate) = actual.get(idx) else {
            return false;
        };
        let is_var = segment.starts_with('{') && segment.ends_with('}');
        if !is_var && segment != candidate {
            return false;
        }
        idx += 1;
    }
    idx == actual.len()
}

/// `equals` operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Literal(String),
    /// Left behind by an unbound interpolation token. Never equal to anything.
    Missing,
    UserName,
    Method,
    Path,
}

impl Operand {
    fn resolve(&self, view: &RequestView<'_>) -> Option<String> {
        match self {
            Operand::Literal(text) => Some(text.clone()),
            Operand::Missing => None,
            Operand::UserName => view.user_name.map(str::to_string),
            Operand::Method => Some(view.method.as_str().to_string()),
            Operand::Path => Some(view.path.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct CustomMatcher {
    pub name: String,
    pub inner: Arc<dyn CustomPredicate>,
}

impl fmt::Debug for CustomMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMatcher")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Const(bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    PathMatch(PathMatcher),
    MethodMatch(Vec<Method>),
    FieldEq { key: String, value: Option<Value> },
    FieldExists(Vec<String>),
    DocContains(Vec<String>),
    ValueEq(Operand, Operand),
    Custom(CustomMatcher),
}

impl Predicate {
    pub fn evaluate(&self, view: &RequestView<'_>) -> bool {
        match self {
            Predicate::Const(value) => *value,
            Predicate::And(items) => items.iter().all(|p| p.evaluate(view)),
            Predicate::Or(items) => items.iter().any(|p| p.evaluate(view)),
            Predicate::Not(inner) => !inner.evaluate(view),
            Predicate::PathMatch(matcher) => matcher.matches(view.path),
            Predicate::MethodMatch(methods) => methods.contains(&view.method),
            Predicate::FieldEq { key, value } => match (view.document, value) {
                (Some(doc), Some(expected)) if !key.is_empty() => doc
                    .get(key)
                    .is_some_and(|actual| json_equals(actual, expected)),
                _ => false,
            },
            Predicate::FieldExists(keys) => view.document.is_some_and(|doc| {
                keys.iter()
                    .all(|k| doc.get(k).is_some_and(|v| !v.is_null()))
            }),
            Predicate::DocContains(keys) => view
                .document
                .is_some_and(|doc| keys.iter().all(|k| doc.contains(k))),
            Predicate::ValueEq(left, right) => {
                match (left.resolve(view), right.resolve(view)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            Predicate::Custom(custom) => custom.inner.evaluate(view),
        }
    }

    /// True when the predicate inspects the request body.
    pub fn reads_content(&self) -> bool {
        match self {
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().any(Predicate::reads_content)
            }
            Predicate::Not(inner) => inner.reads_content(),
            Predicate::FieldEq { .. } | Predicate::FieldExists(_) | Predicate::DocContains(_) => {
                true
            }
            Predicate::Custom(custom) => custom.inner.reads_content(),
            _ => false,
        }
    }
}

/// JSON equality that treats `1` and `1.0` as the same number.
pub(crate) fn json_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view<'a>(method: Method, path: &'a str) -> RequestView<'a> {
        RequestView::new(method, path)
    }

    #[test]
    fn prefix_is_segment_aware() {
        let matcher = PathMatcher::Prefix(vec!["/db/coll".into()]);
        assert!(matcher.matches("/db/coll"));
        assert!(matcher.matches("/db/coll/"));
        assert!(matcher.matches("/db/coll/doc"));
        assert!(!matcher.matches("/db/collection"));
    }

    #[test]
    fn template_variables_and_tail() {
        let matcher = PathMatcher::Template(vec!["/{db}/users/*".into()]);
        assert!(matcher.matches("/acme/users"));
        assert!(matcher.matches("/acme/users/bob/extra"));
        assert!(!matcher.matches("/acme/groups/bob"));

        let exact = PathMatcher::Template(vec!["/{db}/{coll}".into()]);
        assert!(exact.matches("/a/b"));
        assert!(!exact.matches("/a/b/c"));
        assert!(!exact.matches("/a"));
    }

    #[test]
    fn missing_operand_never_equals() {
        let p = Predicate::ValueEq(Operand::Missing, Operand::Missing);
        assert!(!p.evaluate(&view(Method::Get, "/")));

        let p = Predicate::ValueEq(Operand::Path, Operand::Literal("/a".into()));
        assert!(p.evaluate(&view(Method::Get, "/a")));
    }

    #[test]
    fn update_operators_are_unwrapped() {
        let doc = DocumentView::new(&json!({"$set": {"owner.name": "bob", "n": 1}}));
        assert!(doc.contains("owner.name"));
        assert_eq!(doc.get("n"), Some(&json!(1)));
        assert!(!doc.contains("$set"));
    }

    #[test]
    fn field_eq_compares_numbers_loosely() {
        let doc = DocumentView::new(&json!({"a": {"b": 1.0}}));
        let p = Predicate::FieldEq {
            key: "a.b".into(),
            value: Some(json!(1)),
        };
        let v = view(Method::Post, "/db/coll").with_document(Some(&doc));
        assert!(p.evaluate(&v));
        assert!(!p.evaluate(&view(Method::Post, "/db/coll")));
    }
}
