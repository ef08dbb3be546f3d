use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interpolate::BindingContext;
use crate::predicate::{Predicate, PredicateParseError, PredicateParser};

pub const DEFAULT_PRIORITY: i32 = i32::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
    Veto,
}

/// ACL file root:
///
/// ```yaml
/// permissions:
///   - roles: [user]
///     predicate: "path-prefix('/shop') and method(GET)"
///     readFilter: { owner: "@user.name" }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AclFile {
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSpec {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub predicate: String,
    #[serde(default)]
    pub effect: Effect,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_request: Option<Value>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl PermissionSpec {
    pub fn all_roles(&self) -> Vec<String> {
        let mut roles = self.roles.clone();
        if let Some(role) = &self.role {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }
}

/// Compiled permission. Lower `priority` wins when several allow rules match.
#[derive(Clone, Debug)]
pub struct AclRule {
    pub id: usize,
    pub roles: Vec<String>,
    pub effect: Effect,
    pub priority: i32,
    pub source: String,
    compiled: Option<Predicate>,
    pub read_filter: Option<Value>,
    pub write_filter: Option<Value>,
    pub merge_request: Option<Value>,
}

impl AclRule {
    /// Compiles a permission. Text free of interpolation tokens is compiled
    /// once here; text with tokens is syntax-checked with every token
    /// masked by a literal and compiled per request.
    pub fn compile(
        id: usize,
        spec: &PermissionSpec,
        parser: &PredicateParser,
    ) -> Result<Self, PredicateParseError> {
        let masked = BindingContext::mask_tokens(&spec.predicate);
        let compiled = if masked == spec.predicate {
            Some(parser.parse(&spec.predicate)?)
        } else {
            parser.parse(&masked)?;
            None
        };
        Ok(Self {
            id,
            roles: spec.all_roles(),
            effect: spec.effect,
            priority: spec.priority,
            source: spec.predicate.clone(),
            compiled,
            read_filter: spec.read_filter.clone(),
            write_filter: spec.write_filter.clone(),
            merge_request: spec.merge_request.clone(),
        })
    }

    pub fn is_templated(&self) -> bool {
        self.compiled.is_none()
    }

    /// Predicate for one request: the cached tree, or the interpolated text
    /// compiled on the spot.
    pub fn predicate(
        &self,
        bindings: &BindingContext,
        parser: &PredicateParser,
    ) -> Result<Cow<'_, Predicate>, PredicateParseError> {
        match &self.compiled {
            Some(predicate) => Ok(Cow::Borrowed(predicate)),
            None => parser
                .parse(&bindings.interpolate_all(&self.source))
                .map(Cow::Owned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(predicate: &str) -> PermissionSpec {
        PermissionSpec {
            roles: vec!["user".into()],
            role: None,
            predicate: predicate.into(),
            effect: Effect::Allow,
            priority: DEFAULT_PRIORITY,
            read_filter: None,
            write_filter: None,
            merge_request: None,
        }
    }

    #[test]
    fn static_text_is_compiled_once() {
        let parser = PredicateParser::new();
        let rule = AclRule::compile(0, &spec("path-prefix('/a') and method(GET)"), &parser).unwrap();
        assert!(!rule.is_templated());
    }

    #[test]
    fn templated_text_is_checked_at_load() {
        let parser = PredicateParser::new();
        let rule = AclRule::compile(0, &spec("equals(@user.name, %u)"), &parser).unwrap();
        assert!(rule.is_templated());

        assert!(AclRule::compile(0, &spec("equals(@user.name, %u"), &parser).is_err());
    }

    #[test]
    fn templated_list_predicates_load() {
        let parser = PredicateParser::new();
        let rule = AclRule::compile(
            0,
            &spec("method(GET) and qparams-contain(@user.requiredParam)"),
            &parser,
        )
        .unwrap();
        assert!(rule.is_templated());
        assert!(AclRule::compile(0, &spec("qparams-contain()"), &parser).is_err());
    }

    #[test]
    fn yaml_defaults() {
        let file: AclFile = serde_yaml::from_str(
            "permissions:\n  - role: admin\n    predicate: 'true'\n  - roles: [a, b]\n    predicate: 'false'\n    effect: veto\n    priority: 3\n",
        )
        .unwrap();
        assert_eq!(file.permissions[0].all_roles(), vec!["admin".to_string()]);
        assert_eq!(file.permissions[0].priority, DEFAULT_PRIORITY);
        assert_eq!(file.permissions[1].effect, Effect::Veto);
        assert_eq!(file.permissions[1].priority, 3);
    }
}
