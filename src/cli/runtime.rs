use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{env_overrides, GatewayConfig};

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("Failed to install log subscriber")?;
    }
    Ok(())
}

pub struct LoadedConfig {
    pub config: GatewayConfig,
    pub path: Option<PathBuf>,
}

/// Candidate config locations, most specific first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/docgate.yaml")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("docgate");
        dir.push("config.yaml");
        paths.push(dir);
    }
    paths
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => default_config_paths().into_iter().find(|p| p.exists()),
    };

    let text = match &path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            info!("Loaded configuration from: {}", path.display());
            text
        }
        None => {
            warn!("Config file not found, using defaults");
            String::new()
        }
    };

    let overrides = env_overrides();
    if !overrides.is_empty() {
        info!(count = overrides.len(), "applying environment overrides");
    }
    let config = GatewayConfig::from_yaml_with_overrides(&text, overrides)
        .context("Failed to parse config file")?;
    Ok(LoadedConfig { config, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[tokio::test]
    #[serial]
    async fn explicit_path_is_loaded_and_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docgate.yaml");
        std::fs::write(&path, "server:\n  bind: 127.0.0.1:9100\n  max_body_bytes: 10\n").unwrap();

        env::set_var("DOCGATE__SERVER__MAX_BODY_BYTES", "2048");
        let loaded = load_config(Some(&path)).await;
        env::remove_var("DOCGATE__SERVER__MAX_BODY_BYTES");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.server.bind, "127.0.0.1:9100");
        assert_eq!(loaded.config.server.max_body_bytes, 2048);
    }

    #[tokio::test]
    #[serial]
    async fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(load_config(Some(&missing)).await.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn malformed_env_override_fails_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docgate.yaml");
        std::fs::write(&path, "").unwrap();

        env::set_var("DOCGATE__QUERY__MAX_PAGESIZE", "lots");
        let loaded = load_config(Some(&path)).await;
        env::remove_var("DOCGATE__QUERY__MAX_PAGESIZE");

        assert!(loaded.is_err());
    }
}
