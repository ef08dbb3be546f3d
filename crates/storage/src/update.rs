//! Update operator application (`$set`, `$unset`, `$inc`, `$push`,
//! `$addToSet`, `$pull`).

use serde_json::{Map, Value};

use crate::filter::values_equal;
use crate::native::{codes, NativeError};

/// True for `{"$set": ..}` style documents.
pub fn is_operator_document(update: &Value) -> bool {
    update
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

/// Whether a replacement carries update operators at top level.
pub fn has_operators(doc: &Value) -> bool {
    doc.as_object()
        .is_some_and(|m| m.keys().any(|k| k.starts_with('$')))
}

/// Applies `update` to `doc` in place. A document without operators is
/// treated as `$set` of each of its fields.
pub fn apply_update(doc: &mut Value, update: &Value) -> Result<(), NativeError> {
    let map = update
        .as_object()
        .ok_or_else(|| NativeError::bad_value("update must be an object"))?;
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    if !has_operators(update) {
        for (path, value) in map {
            check_path(path)?;
            guard_id(doc, path, value)?;
            set_path(doc, path, value.clone())?;
        }
        return Ok(());
    }
    if !is_operator_document(update) {
        return Err(NativeError::bad_value(
            "update document mixes operators and plain fields",
        ));
    }
    for (op, args) in map {
        let args = args.as_object().ok_or_else(|| {
            NativeError::bad_value(format!("Modifiers operate on fields but {op} got a non-object"))
        })?;
        for (path, arg) in args {
            check_path(path)?;
            match op.as_str() {
                "$set" => {
                    guard_id(doc, path, arg)?;
                    set_path(doc, path, arg.clone())?;
                }
                "$unset" => {
                    forbid_id(path)?;
                    unset_path(doc, path);
                }
                "$inc" => {
                    forbid_id(path)?;
                    increment(doc, path, arg)?;
                }
                "$push" | "$addToSet" => {
                    forbid_id(path)?;
                    append(doc, path, arg, op == "$addToSet")?;
                }
                "$pull" => {
                    forbid_id(path)?;
                    pull(doc, path, arg);
                }
                other => {
                    return Err(NativeError::bad_value(format!("Unknown modifier: {other}")));
                }
            }
        }
    }
    Ok(())
}

fn check_path(path: &str) -> Result<(), NativeError> {
    if path.ends_with('.') || path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(NativeError::new(
            codes::INVALID_PATH,
            "FieldPath must not end with a '.'",
        ));
    }
    Ok(())
}

fn immutable_id() -> NativeError {
    NativeError::new(
        codes::IMMUTABLE_FIELD,
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

fn is_id_path(path: &str) -> bool {
    path == "_id" || path.starts_with("_id.")
}

fn forbid_id(path: &str) -> Result<(), NativeError> {
    if is_id_path(path) {
        return Err(immutable_id());
    }
    Ok(())
}

/// Setting `_id` to its current value is a no-op; anything else is rejected.
fn guard_id(doc: &Value, path: &str, value: &Value) -> Result<(), NativeError> {
    if !is_id_path(path) {
        return Ok(());
    }
    match doc.get("_id") {
        Some(current) if path == "_id" && values_equal(current, value) => Ok(()),
        None => Ok(()),
        _ => Err(immutable_id()),
    }
}

fn get_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn not_viable(path: &str) -> NativeError {
    NativeError::new(
        codes::PATH_NOT_VIABLE,
        format!("Cannot create field in element along path '{path}'"),
    )
}

pub(crate) fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<(), NativeError> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };
    let mut current = doc;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let idx = segment.parse::<usize>().map_err(|_| not_viable(path))?;
                if items.len() <= idx {
                    items.resize(idx + 1, Value::Null);
                }
                let slot = &mut items[idx];
                if slot.is_null() {
                    *slot = Value::Object(Map::new());
                }
                slot
            }
            _ => return Err(not_viable(path)),
        };
    }
    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let idx = last.parse::<usize>().map_err(|_| not_viable(path))?;
            if items.len() <= idx {
                items.resize(idx + 1, Value::Null);
            }
            items[idx] = value;
            Ok(())
        }
        _ => Err(not_viable(path)),
    }
}

fn unset_path(doc: &mut Value, path: &str) {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_mut(doc, parent), last),
        None => (Some(doc), path),
    };
    match parent {
        Some(Value::Object(map)) => {
            map.remove(last);
        }
        Some(Value::Array(items)) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

fn increment(doc: &mut Value, path: &str, by: &Value) -> Result<(), NativeError> {
    let Value::Number(by) = by else {
        return Err(NativeError::new(
            codes::TYPE_MISMATCH,
            "Cannot increment with non-numeric argument",
        ));
    };
    let next = match get_mut(doc, path) {
        None => Value::Number(by.clone()),
        Some(Value::Number(current)) => match (current.as_i64(), by.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(Value::from)
                .unwrap_or_else(|| float(a as f64 + b as f64)),
            _ => float(current.as_f64().unwrap_or_default() + by.as_f64().unwrap_or_default()),
        },
        Some(_) => {
            return Err(NativeError::new(
                codes::TYPE_MISMATCH,
                format!("Cannot apply $inc to a value of non-numeric type at '{path}'"),
            ))
        }
    };
    set_path(doc, path, next)
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn append(doc: &mut Value, path: &str, arg: &Value, unique: bool) -> Result<(), NativeError> {
    let items: Vec<Value> = match arg.get("$each") {
        Some(Value::Array(each)) => each.clone(),
        Some(_) => return Err(NativeError::bad_value("$each needs an array")),
        None => vec![arg.clone()],
    };
    match get_mut(doc, path) {
        None => {
            let mut fresh = Vec::new();
            for item in items {
                if !unique || !fresh.iter().any(|v| values_equal(v, &item)) {
                    fresh.push(item);
                }
            }
            set_path(doc, path, Value::Array(fresh))
        }
        Some(Value::Array(existing)) => {
            for item in items {
                if !unique || !existing.iter().any(|v| values_equal(v, &item)) {
                    existing.push(item);
                }
            }
            Ok(())
        }
        Some(_) => Err(NativeError::new(
            codes::TYPE_MISMATCH,
            format!("The field '{path}' must be an array"),
        )),
    }
}

fn pull(doc: &mut Value, path: &str, arg: &Value) {
    if let Some(Value::Array(existing)) = get_mut(doc, path) {
        existing.retain(|v| !values_equal(v, arg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn plain_fields_are_set() {
        let mut doc = json!({"_id": 1, "a": {"b": 1}});
        apply_update(&mut doc, &json!({"a.c": 2, "d": true})).unwrap();
        assert_eq!(doc, json!({"_id": 1, "a": {"b": 1, "c": 2}, "d": true}));
    }

    #[test]
    fn operators() {
        let mut doc = json!({"_id": 1, "n": 1, "tags": ["a"], "gone": 1});
        apply_update(
            &mut doc,
            &json!({
                "$inc": {"n": 2, "m": 1.5},
                "$push": {"tags": {"$each": ["b", "c"]}},
                "$addToSet": {"tags": "a"},
                "$unset": {"gone": ""},
                "$set": {"x.y": "z"}
            }),
        )
        .unwrap();
        assert_eq!(
            doc,
            json!({"_id": 1, "n": 3, "m": 1.5, "tags": ["a", "b", "c"], "x": {"y": "z"}})
        );
        apply_update(&mut doc, &json!({"$pull": {"tags": "b"}})).unwrap();
        assert_eq!(doc["tags"], json!(["a", "c"]));
    }

    #[test]
    fn native_codes_for_bad_updates() {
        let mut doc = json!({"_id": 1, "s": "x"});
        assert_eq!(
            apply_update(&mut doc, &json!({"$set": {"_id": 2}})).unwrap_err().code,
            codes::IMMUTABLE_FIELD
        );
        assert!(apply_update(&mut doc, &json!({"$set": {"_id": 1}})).is_ok());
        assert_eq!(
            apply_update(&mut doc, &json!({"$set": {"a.": 1}})).unwrap_err().code,
            codes::INVALID_PATH
        );
        assert_eq!(
            apply_update(&mut doc, &json!({"$rename": {"a": "b"}})).unwrap_err().code,
            codes::BAD_VALUE
        );
        assert_eq!(
            apply_update(&mut doc, &json!({"$inc": {"s": 1}})).unwrap_err().code,
            codes::TYPE_MISMATCH
        );
    }
}
