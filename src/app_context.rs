//! Application context and shared components
//!
//! Builds the store, ACL registry, realm and dispatcher once per process and
//! hands the same instances to the HTTP server and the reload task.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use docgate_acl::loader::{compile_acl_file, reload_into};
use docgate_acl::{AclRegistry, AclStore, PredicateParser};
use docgate_pipeline::{Dispatcher, FileRealm, GatewayContext};
use docgate_storage::{DocumentStore, MemoryStore};
use tracing::{info, warn};

use crate::config::GatewayConfig;

pub struct AppContext {
    config: Arc<GatewayConfig>,
    acl: Arc<AclStore>,
    parser: Arc<PredicateParser>,
    dispatcher: Arc<Dispatcher>,
}

impl AppContext {
    /// Context over a fresh in-memory store.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: GatewayConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let parser = Arc::new(PredicateParser::new());
        let registry = match &config.acl.path {
            Some(path) => compile_acl_file(path, parser.clone())
                .map_err(|err| anyhow::anyhow!(err.0.summary()))
                .with_context(|| format!("Failed to load ACL file {}", path.display()))?,
            None => {
                warn!("no acl file configured; every request will be denied");
                AclRegistry::empty(parser.clone())
            }
        };
        info!(rules = registry.len(), "acl registry loaded");
        let acl = Arc::new(AclStore::new(Arc::new(registry)));

        let realm = build_realm(&config)?;
        info!(users = realm.len(), realm = %config.auth.realm, "user realm loaded");

        let gateway = GatewayContext::new(
            store,
            acl.clone(),
            Arc::new(realm),
            config.pipeline_settings(),
        );
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(gateway)));

        Ok(Self {
            config: Arc::new(config),
            acl,
            parser,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn acl_rules(&self) -> usize {
        self.acl.snapshot().len()
    }

    pub fn acl_path(&self) -> Option<&PathBuf> {
        self.config.acl.path.as_ref()
    }

    /// Recompiles the configured ACL file and publishes it. A broken file
    /// leaves the live rules in place.
    pub fn reload_acl(&self) -> Result<usize> {
        let path = self
            .acl_path()
            .context("no acl file configured; nothing to reload")?;
        reload_into(&self.acl, path, self.parser.clone())
            .map_err(|err| anyhow::anyhow!(err.0.summary()))
            .with_context(|| format!("Failed to reload ACL file {}", path.display()))
    }
}

fn build_realm(config: &GatewayConfig) -> Result<FileRealm> {
    let inline = FileRealm::new(config.auth.users.iter().cloned());
    match &config.auth.users_file {
        Some(path) => {
            let file = FileRealm::from_file(path)
                .map_err(|err| anyhow::anyhow!(err.0.summary()))
                .with_context(|| format!("Failed to load users file {}", path.display()))?;
            Ok(inline.merge(file))
        }
        None => Ok(inline),
    }
}
