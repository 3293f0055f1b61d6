use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::config::proc_loader::file_to_config;
use crate::config::ServiceConfig;

/// Load the service settings, a missing file means all defaults.
pub async fn run(config_path: &str) -> Result<ServiceConfig> {
    let path = Path::new(config_path);
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = config_path, "no config file, using defaults");
        return Ok(ServiceConfig::default());
    }
    file_to_config(path)
        .await
        .map_err(|e| anyhow!("Invalid config format: {:#}", e))
}
