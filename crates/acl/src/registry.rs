use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::errors::AclError;
use crate::model::{AclFile, AclRule, Effect};
use crate::predicate::PredicateParser;

/// Immutable compiled rule set. Allow rules are grouped by role and sorted by
/// priority; veto rules apply to every request.
#[derive(Debug)]
pub struct AclRegistry {
    allow: HashMap<String, Vec<Arc<AclRule>>>,
    veto: Vec<Arc<AclRule>>,
    parser: Arc<PredicateParser>,
}

impl Default for AclRegistry {
    fn default() -> Self {
        Self::empty(Arc::new(PredicateParser::new()))
    }
}

impl AclRegistry {
    pub fn empty(parser: Arc<PredicateParser>) -> Self {
        Self {
            allow: HashMap::new(),
            veto: Vec::new(),
            parser,
        }
    }

    pub fn compile(file: &AclFile, parser: Arc<PredicateParser>) -> Result<Self, AclError> {
        let mut registry = Self::empty(parser);
        for (id, spec) in file.permissions.iter().enumerate() {
            let rule = AclRule::compile(id, spec, &registry.parser).map_err(|err| {
                crate::errors::invalid_rules(&format!("permission #{id}: {err}"))
            })?;
            registry.insert(rule);
        }
        for rules in registry.allow.values_mut() {
            rules.sort_by_key(|r| r.priority);
        }
        Ok(registry)
    }

    fn insert(&mut self, rule: AclRule) {
        let rule = Arc::new(rule);
        match rule.effect {
            Effect::Veto => self.veto.push(rule),
            Effect::Allow => {
                for role in &rule.roles {
                    self.allow
                        .entry(role.clone())
                        .or_default()
                        .push(rule.clone());
                }
            }
        }
    }

    /// Allow rules owned by `role`; empty for unknown roles.
    pub fn allow_rules_for(&self, role: &str) -> &[Arc<AclRule>] {
        self.allow.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn veto_rules(&self) -> &[Arc<AclRule>] {
        &self.veto
    }

    pub fn parser(&self) -> &PredicateParser {
        &self.parser
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.allow.keys().map(String::as_str)
    }

    /// Distinct compiled rules.
    pub fn len(&self) -> usize {
        let mut ids: Vec<usize> = self
            .allow
            .values()
            .flatten()
            .chain(self.veto.iter())
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.veto.is_empty()
    }
}

/// Live registry handle. Readers take lock-free snapshots; a reload swaps the
/// whole registry and keeps the previous one for rollback.
pub struct AclStore {
    current: ArcSwap<AclRegistry>,
    lkg: ArcSwap<AclRegistry>,
}

impl AclStore {
    pub fn new(initial: Arc<AclRegistry>) -> Self {
        Self {
            current: ArcSwap::from(initial.clone()),
            lkg: ArcSwap::from(initial),
        }
    }

    pub fn snapshot(&self) -> Arc<AclRegistry> {
        self.current.load_full()
    }

    pub fn publish(&self, next: Arc<AclRegistry>) {
        let previous = self.current.swap(next);
        self.lkg.store(previous);
    }

    pub fn rollback(&self) -> Arc<AclRegistry> {
        let registry = self.lkg.load_full();
        self.current.store(registry.clone());
        registry
    }
}

impl Default for AclStore {
    fn default() -> Self {
        Self::new(Arc::new(AclRegistry::default()))
    }
}
