use async_trait::async_trait;
use docgate_core_types::ResourceType;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

/// Terminal stage for (resource type, method) pairs without a handler.
/// Paths naming a reserved `_` database or collection are refused as such.
pub struct NotImplementedStage;

#[async_trait]
impl Stage for NotImplementedStage {
    fn name(&self) -> &'static str {
        "not-implemented"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let reserved = ex.resource_type == ResourceType::Invalid
            && [&ex.resource.db, &ex.resource.collection]
                .into_iter()
                .flatten()
                .any(|segment| segment.starts_with('_'));
        let err = if reserved {
            PipelineError::reserved_resource(ex.path())
        } else {
            PipelineError::not_implemented(ex.method(), ex.resource_type)
        };
        ex.set_error(err);
        Ok(())
    }
}
