//! Credential checking. The [`FileRealm`] keeps a static user list, loaded
//! from the gateway config or a separate users file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docgate_core_types::Account;
use docgate_errors::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::PipelineError;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` when the scheme is not handled, so the request proceeds
    /// anonymously. Wrong credentials are an error.
    async fn authenticate(&self, authorization: &str) -> Result<Option<Account>, PipelineError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub properties: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserSpec>,
}

/// HTTP Basic realm over a fixed user list.
#[derive(Clone, Debug, Default)]
pub struct FileRealm {
    users: HashMap<String, UserSpec>,
}

impl FileRealm {
    pub fn new(users: impl IntoIterator<Item = UserSpec>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.name.clone(), u)).collect(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        let file: UsersFile = serde_yaml::from_str(text).map_err(|e| {
            PipelineError(
                ErrorBuilder::new(codes::CONFIG_INVALID)
                    .dev_msg(format!("users file: {e}"))
                    .build(),
            )
        })?;
        Ok(Self::new(file.users))
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError(
                ErrorBuilder::new(codes::CONFIG_INVALID)
                    .dev_msg(format!("read {}: {e}", path.display()))
                    .build(),
            )
        })?;
        Self::from_yaml(&text)
    }

    /// Adds `other`'s users; on a name clash `other` wins.
    pub fn merge(mut self, other: FileRealm) -> Self {
        self.users.extend(other.users);
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn verify(&self, user: &str, password: &str) -> Option<Account> {
        let spec = self.users.get(user)?;
        if spec.password != password {
            return None;
        }
        let account = Account::new(&spec.name, spec.roles.iter().cloned());
        Some(match &spec.properties {
            Some(props) => account.with_properties(props.clone()),
            None => account,
        })
    }
}

#[async_trait]
impl Authenticator for FileRealm {
    async fn authenticate(&self, authorization: &str) -> Result<Option<Account>, PipelineError> {
        let Some(encoded) = strip_scheme(authorization, "Basic") else {
            debug!("authorization scheme not handled by the file realm");
            return Ok(None);
        };
        let decoded = STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| PipelineError::unauthenticated("malformed basic credentials"))?;
        let (user, password) = decoded
            .split_once(':')
            .ok_or_else(|| PipelineError::unauthenticated("malformed basic credentials"))?;
        self.verify(user, password)
            .map(Some)
            .ok_or_else(|| PipelineError::unauthenticated("wrong credentials"))
    }
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (found, rest) = header.trim().split_once(' ')?;
    found.eq_ignore_ascii_case(scheme).then_some(rest)
}

/// `Authorization` header value for HTTP Basic.
pub fn basic_header(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn realm() -> FileRealm {
        FileRealm::from_yaml(
            r#"
users:
  - name: alice
    password: secret
    roles: [user]
    properties: { tenant: acme }
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let account = realm()
            .authenticate(&basic_header("alice", "secret"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.name, "alice");
        assert!(account.roles.contains("user"));
        assert_eq!(account.properties, json!({"tenant": "acme"}));
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let err = realm()
            .authenticate(&basic_header("alice", "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.0.http_status, 401);
        assert!(realm().authenticate("Basic !!!").await.is_err());
    }

    #[tokio::test]
    async fn other_schemes_pass_through() {
        assert!(realm().authenticate("Bearer abc").await.unwrap().is_none());
    }

    #[test]
    fn merge_prefers_the_later_realm() {
        let extra = FileRealm::new([UserSpec {
            name: "alice".into(),
            password: "rotated".into(),
            roles: vec![],
            properties: None,
        }]);
        let merged = realm().merge(extra);
        assert_eq!(merged.len(), 1);
        assert!(merged.verify("alice", "rotated").is_some());
        assert!(merged.verify("alice", "secret").is_none());
    }
}
