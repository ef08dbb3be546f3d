use async_trait::async_trait;
use docgate_core_types::ResourceType;
use docgate_operations::prelude::*;

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::Stage;

const POLICY: &str = "etagPolicy";
const DOC_POLICY: &str = "etagDocPolicy";

/// Resolves whether the write needs an etag, from the request first and the
/// stored properties outwards.
pub struct EtagPolicyStage {
    pub controller: EtagController,
    pub db_policy: EtagPolicy,
    pub coll_policy: EtagPolicy,
    pub doc_policy: EtagPolicy,
}

#[async_trait]
impl Stage for EtagPolicyStage {
    fn name(&self) -> &'static str {
        "etag-policy"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let method = ex.method();
        let if_match = ex.header("If-Match").is_some();
        let check_etag_param = ex.parsed.check_etag;
        if !method.is_write() || if_match || check_etag_param {
            ex.etag_check_required = method.is_write() && (if_match || check_etag_param);
            return Ok(());
        }
        let (Some(db), coll) = (ex.resource.db.clone(), ex.resource.collection.clone()) else {
            return Ok(());
        };

        let scoped = match self.scoped(ex.resource_type, &db, coll.as_deref()).await {
            Ok(scoped) => scoped,
            Err(err) => {
                ex.set_error(PipelineError::from(err));
                return Ok(());
            }
        };
        let Some((scoped, fallback)) = scoped else {
            return Ok(());
        };
        ex.etag_check_required = check_required(&EtagCheckInputs {
            method,
            if_match,
            check_etag_param,
            scoped: &scoped,
            fallback,
        });
        Ok(())
    }
}

impl EtagPolicyStage {
    async fn scoped(
        &self,
        resource_type: ResourceType,
        db: &str,
        coll: Option<&str>,
    ) -> Result<Option<(Vec<Option<EtagPolicy>>, EtagPolicy)>, OperationError> {
        let db_props = self.controller.database_properties(db).await?;
        let coll_props = match coll {
            Some(coll) => self.controller.collection_properties(db, coll).await?,
            None => None,
        };
        Ok(match resource_type {
            ResourceType::Document | ResourceType::BulkDocuments => Some((
                vec![
                    policy_property(coll_props.as_ref(), DOC_POLICY),
                    policy_property(db_props.as_ref(), DOC_POLICY),
                ],
                self.doc_policy,
            )),
            ResourceType::Collection => Some((
                vec![
                    policy_property(coll_props.as_ref(), POLICY),
                    policy_property(db_props.as_ref(), POLICY),
                ],
                self.coll_policy,
            )),
            ResourceType::Database => Some((
                vec![policy_property(db_props.as_ref(), POLICY)],
                self.db_policy,
            )),
            ResourceType::Root | ResourceType::Invalid => None,
        })
    }
}
