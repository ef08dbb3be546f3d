//! Gateway configuration.
//!
//! A YAML file is read into a JSON tree, `DOCGATE__SECTION__KEY=value`
//! environment overlays are applied on top of it, and the result is
//! deserialized into [`GatewayConfig`]. Missing keys take their defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use docgate_core_types::DocIdType;
use docgate_operations::EtagPolicy;
use docgate_pipeline::{PipelineSettings, UserSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const ENV_PREFIX: &str = "DOCGATE__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("cannot override {key}: {reason}")]
    Override { key: String, reason: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub documents: DocumentsConfig,
    pub query: QueryConfig,
    pub interpolation: InterpolationConfig,
    pub acl: AclConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// How long open connections may drain after a shutdown signal.
    pub shutdown_grace: String,
    pub max_body_bytes: usize,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            shutdown_grace: "5s".to_string(),
            max_body_bytes: 1_048_576,
            cors: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    pub default_id_type: DocIdType,
    pub db_etag_policy: EtagPolicy,
    pub coll_etag_policy: EtagPolicy,
    pub doc_etag_policy: EtagPolicy,
    pub reserved_ids: Vec<String>,
    pub reserved_id_prefixes: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            default_id_type: settings.default_id_type,
            db_etag_policy: settings.db_etag_policy,
            coll_etag_policy: settings.coll_etag_policy,
            doc_etag_policy: settings.doc_etag_policy,
            reserved_ids: settings.reserved_ids,
            reserved_id_prefixes: settings.reserved_id_prefixes,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_pagesize: usize,
    pub max_pagesize: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_pagesize: 100,
            max_pagesize: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Ceiling for `@rnd(bits)`.
    pub rnd_max_bits: u32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self { rnd_max_bits: 4096 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub path: Option<PathBuf>,
    pub reload_on_sighup: bool,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            path: None,
            reload_on_sighup: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub realm: String,
    pub users: Vec<UserSpec>,
    pub users_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "docgate".to_string(),
            users: Vec::new(),
            users_file: None,
        }
    }
}

impl GatewayConfig {
    /// Parses YAML text, applies `overrides` and validates the result.
    pub fn from_yaml_with_overrides<I>(text: &str, overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = if text.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            serde_json::to_value(yaml).map_err(|e| ConfigError::Invalid(e.to_string()))?
        };
        if tree.is_null() {
            tree = Value::Object(Map::new());
        }
        for (key, raw) in overrides {
            let Some(path) = override_path(&key) else {
                continue;
            };
            set_json_value(&mut tree, &path, parse_env_value(&raw)).map_err(|reason| {
                ConfigError::Override {
                    key: key.clone(),
                    reason,
                }
            })?;
        }
        let config: GatewayConfig =
            serde_json::from_value(tree).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.shutdown_grace()?;
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be positive"));
        }
        if self.query.max_pagesize == 0 {
            return Err(invalid("query.max_pagesize", "must be positive"));
        }
        if self.query.default_pagesize == 0 || self.query.default_pagesize > self.query.max_pagesize
        {
            return Err(invalid(
                "query.default_pagesize",
                &format!("must be between 1 and {}", self.query.max_pagesize),
            ));
        }
        if self.interpolation.rnd_max_bits == 0 {
            return Err(invalid("interpolation.rnd_max_bits", "must be positive"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("server.bind", &e.to_string()))
    }

    pub fn shutdown_grace(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.server.shutdown_grace)
            .map_err(|e| invalid("server.shutdown_grace", &e.to_string()))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            default_id_type: self.documents.default_id_type,
            db_etag_policy: self.documents.db_etag_policy,
            coll_etag_policy: self.documents.coll_etag_policy,
            doc_etag_policy: self.documents.doc_etag_policy,
            reserved_ids: self.documents.reserved_ids.clone(),
            reserved_id_prefixes: self.documents.reserved_id_prefixes.clone(),
            default_pagesize: self.query.default_pagesize,
            max_pagesize: self.query.max_pagesize,
            rnd_max_bits: self.interpolation.rnd_max_bits,
            max_body_bytes: self.server.max_body_bytes,
            realm_name: self.auth.realm.clone(),
        }
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// `DOCGATE__` variables of the current process.
pub fn env_overrides() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}

fn override_path(key: &str) -> Option<Vec<String>> {
    let path: Vec<String> = key
        .strip_prefix(ENV_PREFIX)?
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect();
    (!path.is_empty()).then_some(path)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn set_json_value(target: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Err("empty key".to_string());
    };
    let mut current = target;
    for segment in parents {
        current = ensure_object(current, segment)?
            .entry(segment.clone())
            .or_insert(Value::Null);
    }
    ensure_object(current, last)?.insert(last.clone(), value);
    Ok(())
}

fn ensure_object<'a>(value: &'a mut Value, segment: &str) -> Result<&'a mut Map<String, Value>, String> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| format!("{segment} is nested under a non-object value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_text_gives_defaults() {
        let config = GatewayConfig::from_yaml_with_overrides("", vec![]).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.query.max_pagesize, 1000);
        assert_eq!(config.documents.doc_etag_policy, EtagPolicy::Optional);
        assert_eq!(config.shutdown_grace().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let text = "server:\n  bind: 0.0.0.0:9000\nquery:\n  default_pagesize: 10\n";
        let config = GatewayConfig::from_yaml_with_overrides(
            text,
            vars(&[
                ("DOCGATE__SERVER__BIND", "127.0.0.1:7000"),
                ("DOCGATE__DOCUMENTS__DOC_ETAG_POLICY", "REQUIRED"),
                ("DOCGATE__SERVER__CORS", "false"),
                ("DOCGATE__", "ignored"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
        assert!(!config.server.cors);
        assert_eq!(config.query.default_pagesize, 10);
        assert_eq!(config.documents.doc_etag_policy, EtagPolicy::Required);
    }

    #[test]
    fn json_override_replaces_lists() {
        let config = GatewayConfig::from_yaml_with_overrides(
            "",
            vars(&[("DOCGATE__DOCUMENTS__RESERVED_IDS", r#"["_x"]"#)]),
        )
        .unwrap();
        assert_eq!(config.documents.reserved_ids, vec!["_x".to_string()]);
        assert!(config.pipeline_settings().is_reserved_id("_x"));
    }

    #[test]
    fn override_under_scalar_is_rejected() {
        let err = GatewayConfig::from_yaml_with_overrides(
            "server: 3\n",
            vars(&[("DOCGATE__SERVER__BIND", "x")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Override { .. }));
    }

    #[test]
    fn validation_catches_bad_values() {
        let err = GatewayConfig::from_yaml_with_overrides(
            "query:\n  default_pagesize: 5000\n",
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("query.default_pagesize"));

        let err = GatewayConfig::from_yaml_with_overrides(
            "server:\n  shutdown_grace: soon\n",
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("server.shutdown_grace"));

        let err =
            GatewayConfig::from_yaml_with_overrides("server:\n  bind: nowhere\n", vec![]).unwrap_err();
        assert!(err.to_string().contains("server.bind"));
    }

    #[test]
    fn inline_users_are_read() {
        let text = r#"
auth:
  realm: test
  users:
    - name: alice
      password: pw
      roles: [user]
"#;
        let config = GatewayConfig::from_yaml_with_overrides(text, vec![]).unwrap();
        assert_eq!(config.auth.users.len(), 1);
        assert_eq!(config.pipeline_settings().realm_name, "test");
    }
}
