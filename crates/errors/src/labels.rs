use crate::model::ErrorObj;
use std::collections::BTreeMap;

/// Low-cardinality labels for log fields.
pub fn labels(err: &ErrorObj) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("code", err.code.0.to_string());
    map.insert("kind", err.kind.as_str().to_string());
    map.insert("severity", err.severity.as_str().to_string());
    let fault = if err.severity.is_server_fault() { "server" } else { "client" };
    map.insert("fault", fault.to_string());
    map.insert("status", err.http_status.to_string());

    if let Some(value) = err.meta.get("native_code") {
        map.insert("native_code", value.to_string());
    }
    if let Some(value) = err.meta.get("resource") {
        map.insert("resource", value.to_string());
    }

    map
}
