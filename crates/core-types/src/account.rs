use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Pseudo-role assigned to requests that carry no principal.
pub const UNAUTHENTICATED_ROLE: &str = "$unauthenticated";

/// Authenticated principal. Built by the authentication stage and read-only
/// afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default = "empty_object")]
    pub properties: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Account {
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            properties: empty_object(),
        }
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Document form used for `@user` bindings. Explicit properties win over
    /// the synthesized `name`/`roles` entries.
    pub fn to_document(&self) -> Value {
        let mut doc = json!({
            "name": self.name,
            "roles": self.roles.iter().collect::<Vec<_>>(),
        });
        if let (Some(target), Some(props)) = (doc.as_object_mut(), self.properties.as_object()) {
            for (key, value) in props {
                target.insert(key.clone(), value.clone());
            }
        }
        doc
    }
}

/// Role set for a possibly anonymous request.
pub fn effective_roles(account: Option<&Account>) -> Vec<String> {
    match account {
        Some(account) => account.roles.iter().cloned().collect(),
        None => vec![UNAUTHENTICATED_ROLE.to_string()],
    }
}
