use std::sync::Arc;

use async_trait::async_trait;
use docgate_core_types::{effective_roles, Account, Method, QueryParams};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::AclError;
use crate::interpolate::BindingContext;
use crate::model::AclRule;
use crate::predicate::{DocumentView, PredicateParser, RequestView};
use crate::registry::{AclRegistry, AclStore};

/// Everything the authorizer looks at for one request.
#[derive(Clone, Copy, Debug)]
pub struct AuthzRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub account: Option<&'a Account>,
    pub query: Option<&'a QueryParams>,
    pub content: Option<&'a Value>,
    pub bindings: &'a BindingContext,
}

#[derive(Clone, Debug)]
pub struct Decision {
    pub allow: bool,
    pub reason: Option<String>,
    /// Highest-priority allow rule that matched.
    pub rule: Option<Arc<AclRule>>,
}

impl Decision {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
            rule: None,
        }
    }

    pub fn read_filter(&self) -> Option<&Value> {
        self.rule.as_ref().and_then(|r| r.read_filter.as_ref())
    }

    pub fn write_filter(&self) -> Option<&Value> {
        self.rule.as_ref().and_then(|r| r.write_filter.as_ref())
    }

    pub fn merge_request(&self) -> Option<&Value> {
        self.rule.as_ref().and_then(|r| r.merge_request.as_ref())
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn decide(&self, request: &AuthzRequest<'_>) -> Result<Decision, AclError>;
}

/// Role based authorizer over the live [`AclStore`] registry.
pub struct AclAuthorizer {
    store: Arc<AclStore>,
}

impl AclAuthorizer {
    pub fn new(store: Arc<AclStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<AclStore> {
        &self.store
    }

    pub fn is_allowed(&self, request: &AuthzRequest<'_>) -> bool {
        self.evaluate(request).allow
    }

    pub fn evaluate(&self, request: &AuthzRequest<'_>) -> Decision {
        let registry = self.store.snapshot();
        evaluate_with(&registry, request)
    }
}

#[async_trait]
impl Authorizer for AclAuthorizer {
    async fn decide(&self, request: &AuthzRequest<'_>) -> Result<Decision, AclError> {
        Ok(self.evaluate(request))
    }
}

fn evaluate_with(registry: &AclRegistry, request: &AuthzRequest<'_>) -> Decision {
    let documents: Vec<DocumentView> = match request.content {
        Some(Value::Array(items)) => items.iter().map(DocumentView::new).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![DocumentView::new(other)],
    };
    let base = RequestView::new(request.method, request.path)
        .with_user(request.account.map(|a| a.name.as_str()))
        .with_query(request.query);
    let views: Vec<RequestView<'_>> = if documents.is_empty() {
        vec![base]
    } else {
        documents
            .iter()
            .map(|doc| base.with_document(Some(doc)))
            .collect()
    };
    let parser = registry.parser();

    let mut matched: Option<Arc<AclRule>> = None;
    for role in effective_roles(request.account) {
        let hit = registry
            .allow_rules_for(&role)
            .iter()
            .find(|rule| rule_matches(rule, parser, request.bindings, &views, true));
        if let Some(rule) = hit {
            debug!(role = %role, rule = rule.id, "acl allow rule matched");
            if matched.as_ref().map_or(true, |m| rule.priority < m.priority) {
                matched = Some(rule.clone());
            }
        }
    }

    let Some(rule) = matched else {
        return Decision::deny("no allow rule matched");
    };

    if let Some(veto) = registry
        .veto_rules()
        .iter()
        .find(|veto| rule_matches(veto, parser, request.bindings, &views, false))
    {
        debug!(rule = veto.id, "acl veto rule matched");
        return Decision::deny(format!("vetoed by permission #{}", veto.id));
    }

    Decision {
        allow: true,
        reason: None,
        rule: Some(rule),
    }
}

/// Allow rules must hold for every element of a batch; vetoes fire on any.
/// A rule that fails to compile after interpolation never allows and always
/// vetoes.
fn rule_matches(
    rule: &AclRule,
    parser: &PredicateParser,
    bindings: &BindingContext,
    views: &[RequestView<'_>],
    every: bool,
) -> bool {
    let predicate = match rule.predicate(bindings, parser) {
        Ok(predicate) => predicate,
        Err(err) => {
            warn!(rule = rule.id, predicate = %rule.source, error = %err, "acl predicate failed to compile after interpolation");
            return !every;
        }
    };
    if every {
        views.iter().all(|view| predicate.evaluate(view))
    } else {
        views.iter().any(|view| predicate.evaluate(view))
    }
}
