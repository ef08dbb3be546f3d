use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::GatewayConfig;

/// What every subcommand gets: the effective config and where it came from.
#[derive(Clone)]
pub struct CliContext {
    config: Arc<GatewayConfig>,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: GatewayConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
