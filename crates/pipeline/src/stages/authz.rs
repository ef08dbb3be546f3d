use std::sync::Arc;

use async_trait::async_trait;
use docgate_acl::{Authorizer, AuthzRequest, BindingContext, RequestSummary};
use docgate_core_types::effective_roles;
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::exchange::Exchange;
use crate::stages::authn::challenge;
use crate::stages::Stage;

/// ACL gate. On allow it leaves the matched rule's interpolated filters on
/// the exchange for the handlers.
pub struct AuthorizationStage {
    pub authorizer: Arc<dyn Authorizer>,
    pub rnd_max_bits: u32,
    pub realm: String,
}

#[async_trait]
impl Stage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        let bindings = BindingContext::new(
            ex.account.as_ref(),
            ex.content.as_ref(),
            summary(ex),
            Some(&ex.query),
        )
        .with_rnd_max_bits(self.rnd_max_bits);

        let decision = {
            let request = AuthzRequest {
                method: ex.method(),
                path: ex.path(),
                account: ex.account.as_ref(),
                query: Some(&ex.query),
                content: ex.content.as_ref(),
                bindings: &bindings,
            };
            self.authorizer.decide(&request).await
        };
        let decision = match decision {
            Ok(decision) => decision,
            Err(err) => {
                ex.set_error(PipelineError::from(err));
                return Ok(());
            }
        };

        if !decision.allow {
            info!(
                request_id = %ex.request_id,
                path = %ex.path(),
                method = %ex.method(),
                role = ?effective_roles(ex.account.as_ref()),
                reason = decision.reason.as_deref().unwrap_or("no matching rule"),
                "request denied"
            );
            if ex.account.is_none() {
                ex.set_header("WWW-Authenticate", &challenge(&self.realm));
                ex.set_error(PipelineError::unauthenticated("authentication required"));
            } else {
                ex.set_error(PipelineError::forbidden("denied by acl"));
            }
            return Ok(());
        }

        debug!(
            request_id = %ex.request_id,
            rule = decision.rule.as_ref().map(|r| r.source.as_str()),
            "request allowed"
        );
        ex.read_filter = decision.read_filter().map(|f| bindings.interpolate_document(f));
        ex.write_filter = decision.write_filter().map(|f| bindings.interpolate_document(f));
        ex.merge_request = decision
            .merge_request()
            .map(|m| bindings.interpolate_document(m));
        ex.bindings = Some(bindings);
        Ok(())
    }
}

fn summary(ex: &Exchange) -> RequestSummary {
    RequestSummary {
        method: ex.method().to_string(),
        path: ex.path().to_string(),
        db: ex.resource.db.clone(),
        collection: ex.resource.collection.clone(),
        document_id: ex.resource.document.clone(),
        resource_type: ex.resource_type.to_string(),
        user_name: ex.account.as_ref().map(|a| a.name.clone()),
        roles: effective_roles(ex.account.as_ref()),
        remote_address: ex.request.remote_addr.clone(),
    }
}
