use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::errors::{invalid_rules, AclError};
use crate::model::AclFile;
use crate::predicate::PredicateParser;
use crate::registry::{AclRegistry, AclStore};

/// Parses ACL YAML (JSON is accepted too).
pub fn parse_acl_yaml(text: &str) -> Result<AclFile, AclError> {
    serde_yaml::from_str(text).map_err(|err| invalid_rules(&format!("acl parse: {err}")))
}

pub fn load_acl_file(path: &Path) -> Result<AclFile, AclError> {
    let text = fs::read_to_string(path)
        .map_err(|err| invalid_rules(&format!("read {}: {err}", path.display())))?;
    parse_acl_yaml(&text)
}

pub fn compile_acl_file(
    path: &Path,
    parser: Arc<PredicateParser>,
) -> Result<AclRegistry, AclError> {
    let file = load_acl_file(path)?;
    AclRegistry::compile(&file, parser)
}

/// Recompiles `path` and publishes it. On failure the live registry is left
/// untouched.
pub fn reload_into(
    store: &AclStore,
    path: &Path,
    parser: Arc<PredicateParser>,
) -> Result<usize, AclError> {
    let registry = compile_acl_file(path, parser)?;
    let rules = registry.len();
    store.publish(Arc::new(registry));
    info!(path = %path.display(), rules, "acl registry published");
    Ok(rules)
}
