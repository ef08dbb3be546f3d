//! Query filter evaluation, sorting and projection over JSON documents.

use std::cmp::Ordering;

use docgate_core_types::{get_path, ObjectId};
use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::native::NativeError;

const EXTENDED_LITERALS: &[&str] = &["$oid", "$date", "$numberLong", "$numberDecimal"];

/// Tests `doc` against a filter document. `null` matches everything.
pub fn matches(doc: &Value, filter: &Value) -> Result<bool, NativeError> {
    match filter {
        Value::Null => Ok(true),
        Value::Object(map) => matches_map(doc, map),
        _ => Err(NativeError::bad_value("filter must be an object")),
    }
}

fn matches_map(doc: &Value, map: &Map<String, Value>) -> Result<bool, NativeError> {
    for (key, cond) in map {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, cond)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(key, cond)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" {
                    any
                } else {
                    !any
                }
            }
            op if op.starts_with('$') => {
                return Err(NativeError::bad_value(format!(
                    "unknown top level operator: {op}"
                )))
            }
            path => field_matches(doc, path, cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, cond: &'a Value) -> Result<&'a Vec<Value>, NativeError> {
    cond.as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| NativeError::bad_value(format!("{op} must be a nonempty array")))
}

fn field_matches(doc: &Value, path: &str, cond: &Value) -> Result<bool, NativeError> {
    let candidates = resolve(doc, path);
    match operator_map(cond)? {
        Some(ops) => apply_operators(&candidates, ops),
        None => Ok(equals_any(&candidates, cond)),
    }
}

/// `Some` when `cond` is an operator expression such as `{"$gt": 1}`.
fn operator_map(cond: &Value) -> Result<Option<&Map<String, Value>>, NativeError> {
    let Some(map) = cond.as_object() else {
        return Ok(None);
    };
    if map.is_empty() || is_extended_literal(map) {
        return Ok(None);
    }
    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        return Ok(None);
    }
    if operators != map.len() {
        return Err(NativeError::bad_value(
            "cannot mix operators and fields in a field expression",
        ));
    }
    Ok(Some(map))
}

fn is_extended_literal(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.keys().all(|k| EXTENDED_LITERALS.contains(&k.as_str()))
}

fn apply_operators(candidates: &[&Value], ops: &Map<String, Value>) -> Result<bool, NativeError> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_any(candidates, arg),
            "$ne" => !equals_any(candidates, arg),
            "$gt" => compares(candidates, arg, |o| o == Ordering::Greater),
            "$gte" => compares(candidates, arg, |o| o != Ordering::Less),
            "$lt" => compares(candidates, arg, |o| o == Ordering::Less),
            "$lte" => compares(candidates, arg, |o| o != Ordering::Greater),
            "$in" => in_list(candidates, op, arg)?,
            "$nin" => !in_list(candidates, op, arg)?,
            "$exists" => truthy(arg) == !candidates.is_empty(),
            "$size" => {
                let size = arg
                    .as_u64()
                    .ok_or_else(|| NativeError::bad_value("$size needs a non-negative integer"))?;
                candidates
                    .iter()
                    .any(|c| c.as_array().is_some_and(|a| a.len() as u64 == size))
            }
            "$regex" => regex_matches(candidates, arg, ops.get("$options"))?,
            "$options" => true,
            "$not" => match operator_map(arg)? {
                Some(inner) => !apply_operators(candidates, inner)?,
                None => {
                    return Err(NativeError::bad_value("$not needs an operator expression"))
                }
            },
            other => {
                return Err(NativeError::bad_value(format!("unknown operator: {other}")));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(candidates: &[&Value], op: &str, arg: &Value) -> Result<bool, NativeError> {
    let items = arg
        .as_array()
        .ok_or_else(|| NativeError::bad_value(format!("{op} needs an array")))?;
    Ok(items.iter().any(|item| equals_any(candidates, item)))
}

fn regex_matches(
    candidates: &[&Value],
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, NativeError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| NativeError::bad_value("$regex has to be a string"))?;
    let options = options.and_then(Value::as_str).unwrap_or_default();
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| NativeError::bad_value(format!("invalid $regex: {e}")))?;
    Ok(flattened(candidates)
        .any(|v| v.as_str().is_some_and(|s| re.is_match(s))))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

/// Values at a dotted path. Non-numeric segments fan out over arrays of
/// objects the way the document store does.
fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(idx) => next.extend(items.get(idx)),
                    Err(_) => next.extend(
                        items
                            .iter()
                            .filter_map(|item| item.as_object().and_then(|m| m.get(segment))),
                    ),
                },
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Candidates plus the elements of array candidates.
fn flattened<'a>(candidates: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    candidates.iter().flat_map(|c| {
        let elements: Box<dyn Iterator<Item = &'a Value> + 'a> = match c {
            Value::Array(items) => Box::new(std::iter::once(*c).chain(items.iter())),
            _ => Box::new(std::iter::once(*c)),
        };
        elements
    })
}

fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
    if candidates.is_empty() {
        return expected.is_null();
    }
    flattened(candidates).any(|c| values_equal(c, expected))
}

fn compares(candidates: &[&Value], arg: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    flattened(candidates).any(|c| compare_values(c, arg).is_some_and(&accept))
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

/// Ordering within one type bracket; `None` across brackets.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Object(_), Value::Object(_)) => {
            if let (Some(l), Some(r)) = (date_millis(left), date_millis(right)) {
                return Some(l.cmp(&r));
            }
            if let (Some(l), Some(r)) = (ObjectId::from_json(left), ObjectId::from_json(right)) {
                return Some(l.cmp(&r));
            }
            None
        }
        _ => None,
    }
}

fn date_millis(value: &Value) -> Option<i64> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get("$date")? {
        Value::Number(n) => n.as_i64(),
        Value::Object(inner) => inner.get("$numberLong")?.as_str()?.parse().ok(),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(v @ Value::Object(_)) if ObjectId::from_json(v).is_some() => 5,
        Some(v @ Value::Object(_)) if date_millis(v).is_some() => 7,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 6,
    }
}

fn sort_cmp(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let (lr, rr) = (type_rank(left), type_rank(right));
    if lr != rr {
        return lr.cmp(&rr);
    }
    match (left, right) {
        (Some(l), Some(r)) => compare_values(l, r)
            .unwrap_or_else(|| l.to_string().cmp(&r.to_string())),
        _ => Ordering::Equal,
    }
}

/// Sorts in place by a `{"field": 1 | -1, ...}` specification.
pub fn sort_documents(docs: &mut [Value], sort: &Value) -> Result<(), NativeError> {
    let spec = sort
        .as_object()
        .ok_or_else(|| NativeError::bad_value("sort must be an object"))?;
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => {
                return Err(NativeError::bad_value(format!(
                    "bad sort specification for {field}"
                )))
            }
        };
        keys.push((field.as_str(), descending));
    }
    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ord = sort_cmp(get_path(a, field), get_path(b, field));
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Applies a `keys` projection: inclusion (`{"a": 1}`) keeps `_id` unless it
/// is excluded explicitly; exclusion (`{"a": 0}`) drops the listed fields.
pub fn project(doc: &Value, keys: &Value) -> Result<Value, NativeError> {
    let spec = keys
        .as_object()
        .ok_or_else(|| NativeError::bad_value("keys must be an object"))?;
    let Some(source) = doc.as_object() else {
        return Ok(doc.clone());
    };
    let inclusive = spec
        .iter()
        .any(|(field, flag)| field != "_id" && truthy(flag));
    let mut out = Map::new();
    if inclusive {
        if spec.get("_id").map_or(true, truthy) {
            if let Some(id) = source.get("_id") {
                out.insert("_id".into(), id.clone());
            }
        }
        for (field, flag) in spec {
            if field == "_id" || !truthy(flag) {
                continue;
            }
            let top = field.split('.').next().unwrap_or(field);
            if let Some(value) = source.get(top) {
                out.insert(top.to_string(), value.clone());
            }
        }
    } else {
        out = source.clone();
        for field in spec.keys() {
            out.remove(field);
        }
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "_id": {"$oid": "64b7f0000000000000000001"},
            "name": "alice",
            "age": 30,
            "tags": ["a", "b"],
            "items": [{"sku": "x", "qty": 2}, {"sku": "y", "qty": 5}],
            "created": {"$date": 1000}
        })
    }

    #[test]
    fn equality_and_operators() {
        let d = doc();
        assert!(matches(&d, &json!({"name": "alice", "age": 30.0})).unwrap());
        assert!(matches(&d, &json!({"age": {"$gte": 30, "$lt": 31}})).unwrap());
        assert!(matches(&d, &json!({"tags": "b"})).unwrap());
        assert!(matches(&d, &json!({"items.sku": "y"})).unwrap());
        assert!(matches(&d, &json!({"items.qty": {"$gt": 4}})).unwrap());
        assert!(matches(&d, &json!({"missing": null})).unwrap());
        assert!(matches(&d, &json!({"missing": {"$exists": false}})).unwrap());
        assert!(matches(&d, &json!({"name": {"$in": ["bob", "alice"]}})).unwrap());
        assert!(matches(&d, &json!({"name": {"$regex": "^AL", "$options": "i"}})).unwrap());
        assert!(matches(&d, &json!({"_id": {"$oid": "64b7f0000000000000000001"}})).unwrap());
        assert!(matches(&d, &json!({"created": {"$gt": {"$date": 999}}})).unwrap());
        assert!(!matches(&d, &json!({"$or": [{"age": 1}, {"name": {"$ne": "alice"}}]})).unwrap());
        assert!(matches(&d, &json!({"$nor": [{"age": 1}]})).unwrap());
        assert!(matches(&d, &json!({"age": {"$not": {"$lt": 18}}})).unwrap());
    }

    #[test]
    fn unknown_operators_are_bad_values() {
        let d = doc();
        let err = matches(&d, &json!({"age": {"$near": 1}})).unwrap_err();
        assert_eq!(err.code, crate::native::codes::BAD_VALUE);
        assert!(matches(&d, &json!({"$where": "1"})).is_err());
        assert!(matches(&d, &json!([1])).is_err());
    }

    #[test]
    fn sorts_by_multiple_keys() {
        let mut docs = vec![
            json!({"n": 2, "s": "b"}),
            json!({"n": 1, "s": "z"}),
            json!({"n": 2, "s": "a"}),
            json!({"s": "none"}),
        ];
        sort_documents(&mut docs, &json!({"n": -1, "s": 1})).unwrap();
        let order: Vec<_> = docs.iter().map(|d| d["s"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["a", "b", "z", "none"]);
    }

    #[test]
    fn projection_modes() {
        let d = doc();
        let inc = project(&d, &json!({"name": 1})).unwrap();
        assert_eq!(inc, json!({"_id": {"$oid": "64b7f0000000000000000001"}, "name": "alice"}));
        let exc = project(&d, &json!({"items": 0, "tags": 0, "created": 0, "_id": 0})).unwrap();
        assert_eq!(exc, json!({"name": "alice", "age": 30}));
    }
}
