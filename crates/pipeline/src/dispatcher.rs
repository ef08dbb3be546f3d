use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use docgate_core_types::{Method, ResourceType};
use docgate_errors::labels::labels;
use futures::FutureExt;
use tracing::error;

use crate::context::GatewayContext;
use crate::errors::{to_http_response, PipelineError};
use crate::exchange::{Exchange, GatewayRequest, GatewayResponse};
use crate::handlers::Operation;
use crate::stages::*;

/// Resolves the chain for a request once and runs it.
pub struct Dispatcher {
    ctx: Arc<GatewayContext>,
    chains: HashMap<(ResourceType, Method), Arc<PipelinedChain>>,
    not_implemented: Arc<PipelinedChain>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<GatewayContext>) -> Self {
        let settings = &ctx.settings;
        let init: Arc<dyn Stage> = Arc::new(RequestInitStage);
        let authn: Arc<dyn Stage> = Arc::new(AuthenticationStage {
            authenticator: ctx.authenticator.clone(),
            realm: settings.realm_name.clone(),
        });
        let query: Arc<dyn Stage> = Arc::new(QueryParamsStage {
            default_pagesize: settings.default_pagesize,
            max_pagesize: settings.max_pagesize,
            default_id_type: settings.default_id_type,
        });
        let authz: Arc<dyn Stage> = Arc::new(AuthorizationStage {
            authorizer: ctx.authorizer.clone(),
            rnd_max_bits: settings.rnd_max_bits,
            realm: settings.realm_name.clone(),
        });
        let etag: Arc<dyn Stage> = Arc::new(EtagPolicyStage {
            controller: ctx.controller.clone(),
            db_policy: settings.db_etag_policy,
            coll_policy: settings.coll_etag_policy,
            doc_policy: settings.doc_etag_policy,
        });
        let check: Arc<dyn Stage> = Arc::new(ContentCheckStage {
            reserved_ids: settings.reserved_ids.clone(),
            reserved_id_prefixes: settings.reserved_id_prefixes.clone(),
        });
        let inject: Arc<dyn Stage> = Arc::new(ContentInjectionStage);
        let stamp: Arc<dyn Stage> = Arc::new(ResponseStampStage);
        let log: Arc<dyn Stage> = Arc::new(AccessLogStage);

        let chains = Operation::ALL
            .into_iter()
            .map(|operation| {
                let handler: Arc<dyn Stage> = Arc::new(OperationStage {
                    ctx: ctx.clone(),
                    operation,
                });
                let chain = PipelinedChain::new(vec![
                    init.clone(),
                    authn.clone(),
                    query.clone(),
                    authz.clone(),
                    etag.clone(),
                    check.clone(),
                    inject.clone(),
                    handler,
                    stamp.clone(),
                    log.clone(),
                ]);
                (operation.route(), Arc::new(chain))
            })
            .collect();
        let not_implemented = Arc::new(PipelinedChain::new(vec![
            init,
            Arc::new(NotImplementedStage),
            stamp,
            log,
        ]));

        Self {
            ctx,
            chains,
            not_implemented,
        }
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    pub fn chain_for(&self, resource_type: ResourceType, method: Method) -> Arc<PipelinedChain> {
        self.chains
            .get(&(resource_type, method))
            .cloned()
            .unwrap_or_else(|| self.not_implemented.clone())
    }

    /// Replaces the chain serving `(resource_type, method)`.
    pub fn insert_chain(&mut self, resource_type: ResourceType, method: Method, chain: PipelinedChain) {
        self.chains.insert((resource_type, method), Arc::new(chain));
    }

    /// Never fails: unexpected errors and panics become a logged 500.
    pub async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
        let mut ex = Exchange::new(request);
        let chain = self.chain_for(ex.resource_type, ex.method());
        let outcome = AssertUnwindSafe(chain.run(&mut ex)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => ex.into_response(),
            Ok(Err(err)) => {
                error!(
                    request_id = %ex.request_id,
                    path = %ex.path(),
                    labels = ?labels(&err.0),
                    error = ?err,
                    "pipeline failed"
                );
                internal_response(&ex.request_id)
            }
            Err(panic) => {
                error!(
                    request_id = %ex.request_id,
                    path = %ex.path(),
                    panic = panic_message(panic.as_ref()),
                    "pipeline panicked"
                );
                internal_response(&ex.request_id)
            }
        }
    }
}

fn internal_response(request_id: &str) -> GatewayResponse {
    let (status, body) = to_http_response(&PipelineError::internal("unexpected pipeline failure"));
    let mut response = GatewayResponse::new(status);
    response.body = Some(body);
    if !request_id.is_empty() {
        response.insert_header("X-Request-Id", request_id);
    }
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
