use std::sync::Arc;

use docgate_acl::{AclAuthorizer, AclStore, Authorizer};
use docgate_core_types::DocIdType;
use docgate_operations::{BulkAggregator, EtagController, EtagPolicy};
use docgate_storage::DocumentStore;
use serde::{Deserialize, Serialize};

use crate::realm::Authenticator;

/// Knobs the stages and handlers read on every request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub default_id_type: DocIdType,
    pub db_etag_policy: EtagPolicy,
    pub coll_etag_policy: EtagPolicy,
    pub doc_etag_policy: EtagPolicy,
    pub reserved_ids: Vec<String>,
    pub reserved_id_prefixes: Vec<String>,
    pub default_pagesize: usize,
    pub max_pagesize: usize,
    pub rnd_max_bits: u32,
    pub max_body_bytes: usize,
    pub realm_name: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_id_type: DocIdType::StringOid,
            db_etag_policy: EtagPolicy::RequiredForDelete,
            coll_etag_policy: EtagPolicy::RequiredForDelete,
            doc_etag_policy: EtagPolicy::Optional,
            reserved_ids: ["_properties", "_size", "_indexes", "_meta", "_aggrs", "_schemas"]
                .into_iter()
                .map(String::from)
                .collect(),
            reserved_id_prefixes: vec!["_properties.".to_string()],
            default_pagesize: 100,
            max_pagesize: 1000,
            rnd_max_bits: 4096,
            max_body_bytes: 1_048_576,
            realm_name: "docgate".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn is_reserved_id(&self, id: &str) -> bool {
        self.reserved_ids.iter().any(|r| r == id)
            || self
                .reserved_id_prefixes
                .iter()
                .any(|p| id.starts_with(p.as_str()))
    }
}

/// Explicit wiring shared by the dispatcher, stages and handlers.
pub struct GatewayContext {
    pub store: Arc<dyn DocumentStore>,
    pub acl: Arc<AclStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub authenticator: Arc<dyn Authenticator>,
    pub controller: EtagController,
    pub bulk: BulkAggregator,
    pub settings: PipelineSettings,
}

impl GatewayContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        acl: Arc<AclStore>,
        authenticator: Arc<dyn Authenticator>,
        settings: PipelineSettings,
    ) -> Self {
        let authorizer: Arc<dyn Authorizer> = Arc::new(AclAuthorizer::new(acl.clone()));
        Self {
            controller: EtagController::new(store.clone()),
            bulk: BulkAggregator::new(store.clone()),
            store,
            acl,
            authorizer,
            authenticator,
            settings,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
}
