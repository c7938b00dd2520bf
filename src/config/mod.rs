pub mod session_config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{LevelFilter, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::session_config::SessionConfig;

const CONFIG_FILE_NAME: &str = "ble-gatt-explorer.json";

/// Environment variable that points at an alternative config file
pub const CONFIG_PATH_ENV: &str = "BLE_GATT_EXPLORER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    /// Default log level; `RUST_LOG` still wins when set.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            session: SessionConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Where the config is read from: `$BLE_GATT_EXPLORER_CONFIG`, else the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path_str))?;
        let config: Self = serde_json::from_str(&config_json)
            .with_context(|| format!("malformed config file {}", file_path_str))?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// The configured level, falling back to `info` for unknown names.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
