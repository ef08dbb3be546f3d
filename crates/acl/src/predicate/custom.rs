use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::parse::{gapless_texts, named, positional_texts, Arg, ArgValue, PredicateParseError};
use super::{json_equals, RequestView};

/// Extension point for predicates that the built-in grammar does not cover.
pub trait CustomPredicate: Send + Sync {
    fn evaluate(&self, view: &RequestView<'_>) -> bool;

    fn reads_content(&self) -> bool {
        false
    }
}

/// Builds a [`CustomPredicate`] from the call arguments of its predicate text.
pub type CustomFactory =
    Arc<dyn Fn(&[Arg]) -> Result<Arc<dyn CustomPredicate>, PredicateParseError> + Send + Sync>;

pub(crate) fn builtin_factories() -> Vec<(&'static str, CustomFactory)> {
    vec![
        (
            "qparams-contain",
            names_factory("qparams-contain", true, |names| QparamsContain { names }),
        ),
        (
            "qparams-whitelist",
            names_factory("qparams-whitelist", false, |names| QparamsWhitelist { names }),
        ),
        (
            "qparams-blacklist",
            names_factory("qparams-blacklist", true, |names| QparamsBlacklist { names }),
        ),
        (
            "doc-whitelist",
            names_factory("doc-whitelist", false, |keys| DocWhitelist { keys }),
        ),
        (
            "doc-blacklist",
            names_factory("doc-blacklist", true, |keys| DocBlacklist { keys }),
        ),
        ("qparams-size", Arc::new(qparams_size) as CustomFactory),
        (
            "doc-array-contains",
            array_factory("doc-array-contains", |key, values| DocArrayContains { key, values }),
        ),
        (
            "doc-array-is-subset",
            array_factory("doc-array-is-subset", |key, values| DocArrayIsSubset { key, values }),
        ),
    ]
}

/// List predicates never accept an empty slot. Those where an empty list
/// would hold vacuously also need at least one name. An empty whitelist is
/// the strictest whitelist, so it stays legal.
fn names_factory<P, F>(name: &'static str, non_empty: bool, build: F) -> CustomFactory
where
    P: CustomPredicate + 'static,
    F: Fn(BTreeSet<String>) -> P + Send + Sync + 'static,
{
    Arc::new(move |args: &[Arg]| {
        let names: BTreeSet<String> = gapless_texts(name, args)?.into_iter().collect();
        if non_empty && names.is_empty() {
            return Err(PredicateParseError::invalid_args(
                name,
                "at least one argument is required",
            ));
        }
        Ok(Arc::new(build(names)) as Arc<dyn CustomPredicate>)
    })
}

/// `(key=a.b, values=...)`. Each value is read as JSON, falling back to a
/// plain string.
fn array_factory<P, F>(name: &'static str, build: F) -> CustomFactory
where
    P: CustomPredicate + 'static,
    F: Fn(String, Vec<Value>) -> P + Send + Sync + 'static,
{
    Arc::new(move |args: &[Arg]| {
        let key = match named(args, "key") {
            Some(ArgValue::Text { text, .. }) if !text.is_empty() => text.clone(),
            _ => return Err(PredicateParseError::invalid_args(name, "missing key")),
        };
        let values = match named(args, "values") {
            Some(value @ (ArgValue::Text { .. } | ArgValue::List(_))) => value.texts(),
            _ => return Err(PredicateParseError::invalid_args(name, "missing values")),
        };
        if values.is_empty() {
            return Err(PredicateParseError::invalid_args(name, "missing values"));
        }
        let values = values
            .iter()
            .map(|text| serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.clone())))
            .collect();
        Ok(Arc::new(build(key, values)) as Arc<dyn CustomPredicate>)
    })
}

fn qparams_size(args: &[Arg]) -> Result<Arc<dyn CustomPredicate>, PredicateParseError> {
    let texts = positional_texts(args);
    let [size] = texts.as_slice() else {
        return Err(PredicateParseError::invalid_args(
            "qparams-size",
            "expected exactly one size argument",
        ));
    };
    let size = size.parse::<usize>().map_err(|_| {
        PredicateParseError::invalid_args("qparams-size", format!("not a size: {size}"))
    })?;
    Ok(Arc::new(QparamsSize { size }))
}

struct QparamsContain {
    names: BTreeSet<String>,
}

impl CustomPredicate for QparamsContain {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        self.names.iter().all(|name| view.has_param(name))
    }
}

struct QparamsSize {
    size: usize,
}

impl CustomPredicate for QparamsSize {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        view.query_len() == self.size
    }
}

struct QparamsWhitelist {
    names: BTreeSet<String>,
}

impl CustomPredicate for QparamsWhitelist {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        view.query
            .map(|q| q.names().all(|name| self.names.contains(name)))
            .unwrap_or(true)
    }
}

struct QparamsBlacklist {
    names: BTreeSet<String>,
}

impl CustomPredicate for QparamsBlacklist {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        !self.names.iter().any(|name| view.has_param(name))
    }
}

/// Every body field must be a listed key, lie under a listed key, or be an
/// ancestor of one.
struct DocWhitelist {
    keys: BTreeSet<String>,
}

impl DocWhitelist {
    fn allows(&self, path: &str) -> bool {
        self.keys.iter().any(|key| {
            key == path || is_under(path, key) || is_under(key, path)
        })
    }
}

impl CustomPredicate for DocWhitelist {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        match view.document {
            Some(doc) => doc.leaf_paths().all(|path| self.allows(path)),
            None => true,
        }
    }

    fn reads_content(&self) -> bool {
        true
    }
}

struct DocBlacklist {
    keys: BTreeSet<String>,
}

impl CustomPredicate for DocBlacklist {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        match view.document {
            Some(doc) => !self.keys.iter().any(|key| {
                doc.contains(key) || doc.all_paths().any(|path| is_under(path, key))
            }),
            None => true,
        }
    }

    fn reads_content(&self) -> bool {
        true
    }
}

/// The body array at `key` holds every listed value.
struct DocArrayContains {
    key: String,
    values: Vec<Value>,
}

impl CustomPredicate for DocArrayContains {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        match body_array(view, &self.key) {
            Some(items) => self
                .values
                .iter()
                .all(|v| items.iter().any(|item| json_equals(item, v))),
            None => false,
        }
    }

    fn reads_content(&self) -> bool {
        true
    }
}

/// Every element of the body array at `key` is a listed value.
struct DocArrayIsSubset {
    key: String,
    values: Vec<Value>,
}

impl CustomPredicate for DocArrayIsSubset {
    fn evaluate(&self, view: &RequestView<'_>) -> bool {
        match body_array(view, &self.key) {
            Some(items) => items
                .iter()
                .all(|item| self.values.iter().any(|v| json_equals(item, v))),
            None => false,
        }
    }

    fn reads_content(&self) -> bool {
        true
    }
}

fn body_array<'a>(view: &RequestView<'a>, key: &str) -> Option<&'a Vec<Value>> {
    view.document?.get(key)?.as_array()
}

fn is_under(path: &str, ancestor: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('.'))
}
