use async_trait::async_trait;
use docgate_core_types::{Method, ResourceType};
use docgate_operations::OperationError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

/// Body shape checks for writes.
pub struct ContentCheckStage {
    pub reserved_ids: Vec<String>,
    pub reserved_id_prefixes: Vec<String>,
}

#[async_trait]
impl Stage for ContentCheckStage {
    fn name(&self) -> &'static str {
        "content-check"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let method = ex.method();
        if !method.is_write() || method == Method::Delete {
            return Ok(());
        }
        let accepts_array =
            method == Method::Post && ex.resource_type == ResourceType::Collection;

        let content = match ex.content.take() {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(Value::Array(items)) if accepts_array => {
                if let Some(index) = items.iter().position(|i| !i.is_object()) {
                    ex.set_error(PipelineError::invalid_body(format!(
                        "item {index} of the batch is not a json object"
                    )));
                    return Ok(());
                }
                Value::Array(items)
            }
            Some(_) => {
                ex.set_error(PipelineError::invalid_body(if accepts_array {
                    "request data must be a json object or an array of objects"
                } else {
                    "request data must be a json object"
                }));
                return Ok(());
            }
        };
        let mut content = content;
        strip_etag(&mut content);

        let single_document = match ex.resource_type {
            ResourceType::Document => true,
            ResourceType::Collection => method == Method::Post && content.is_object(),
            _ => false,
        };
        if single_document {
            if let Err(err) = self.check_id(ex, &content) {
                ex.content = Some(content);
                ex.set_error(err);
                return Ok(());
            }
        }
        ex.content = Some(content);
        Ok(())
    }
}

impl ContentCheckStage {
    fn is_reserved(&self, id: &str) -> bool {
        self.reserved_ids.iter().any(|r| r == id)
            || self
                .reserved_id_prefixes
                .iter()
                .any(|p| id.starts_with(p.as_str()))
    }

    fn check_id(&self, ex: &Exchange, content: &Value) -> Result<(), PipelineError> {
        if let Some(doc) = ex.resource.document.as_deref() {
            if self.is_reserved(doc) {
                return Err(OperationError::reserved_id(doc).into());
            }
        }
        let Some(id) = content.get("_id") else {
            return Ok(());
        };
        if let Some(id) = id.as_str() {
            if self.is_reserved(id) {
                return Err(OperationError::reserved_id(id).into());
            }
        }
        match ex.document_id() {
            Some(path_id) => {
                let path_id = path_id?;
                if &path_id != id {
                    return Err(PipelineError::invalid_body(
                        "_id in content body is different than id in URL",
                    ));
                }
            }
            None if !ex.parsed.id_type.accepts(id) => {
                return Err(OperationError::id_type_mismatch(id, ex.parsed.id_type).into());
            }
            None => {}
        }
        Ok(())
    }
}

fn strip_etag(content: &mut Value) {
    match content {
        Value::Object(map) => {
            if map.remove("_etag").is_some() {
                debug!("client supplied _etag dropped");
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_etag),
        _ => {}
    }
}

/// Deep-merges the matched rule's interpolated merge document into the body.
pub struct ContentInjectionStage;

#[async_trait]
impl Stage for ContentInjectionStage {
    fn name(&self) -> &'static str {
        "content-injection"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let method = ex.method();
        if !method.is_write() || method == Method::Delete {
            return Ok(());
        }
        let (Some(merge), Some(content)) = (ex.merge_request.as_ref(), ex.content.as_mut()) else {
            return Ok(());
        };
        match content {
            Value::Array(items) => items.iter_mut().for_each(|item| deep_merge(item, merge)),
            other => deep_merge(other, merge),
        }
        Ok(())
    }
}

/// Objects merge key by key; anything else in `patch` overwrites.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
