use std::collections::BTreeMap;

use serde_json::Value;

/// Dotted path to value map. Array elements use their index as a segment,
/// so `{"roles": ["a"]}` flattens to `roles.0 -> "a"`.
pub type FlatDocument = BTreeMap<String, Value>;

/// Flattens a document tree. With `include_containers` every intermediate
/// object and array is also recorded under its own path.
pub fn flatten(value: &Value, include_containers: bool) -> FlatDocument {
    let mut out = FlatDocument::new();
    walk(value, None, include_containers, &mut out);
    out
}

fn walk(value: &Value, prefix: Option<&str>, containers: bool, out: &mut FlatDocument) {
    let join = |segment: &str| match prefix {
        Some(prefix) => format!("{prefix}.{segment}"),
        None => segment.to_string(),
    };

    match value {
        Value::Object(map) => {
            record_container(value, prefix, containers, out);
            for (key, child) in map {
                walk(child, Some(&join(key)), containers, out);
            }
        }
        Value::Array(items) => {
            record_container(value, prefix, containers, out);
            for (idx, child) in items.iter().enumerate() {
                walk(child, Some(&join(&idx.to_string())), containers, out);
            }
        }
        leaf => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), leaf.clone());
            }
        }
    }
}

fn record_container(value: &Value, prefix: Option<&str>, containers: bool, out: &mut FlatDocument) {
    if let Some(prefix) = prefix {
        if containers || is_empty_container(value) {
            out.insert(prefix.to_string(), value.clone());
        }
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Resolves a dotted path, stepping into arrays by numeric segment.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
