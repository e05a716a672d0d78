use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ConfigError;
use crate::source::SourceId;

pub const CONFIG_ENV_VAR: &str = "CHART_INGEST_CONFIG";

/// Everything one batch run needs, loaded once at process start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    /// SQLite database file, or `:memory:`.
    pub database_path: String,
    /// Feed URL per source. Sorted, so every run visits sources in the same order.
    pub sources: BTreeMap<SourceId, String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

pub async fn load_config(config_path: Option<&str>) -> crate::Result<ChartConfig> {
    let config = match config_path {
        Some(path) => ChartConfig::from_file(path)?,
        None => ChartConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

impl ChartConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            origin: path.to_string(),
            error: Box::new(e),
        })?;
        let config: ChartConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let config_str = std::env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::MissingField {
            field: format!("{CONFIG_ENV_VAR} environment variable"),
        })?;
        let config: ChartConfig = serde_yaml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "Database path cannot be empty".to_string(),
            });
        }

        if self.sources.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "At least one source must be configured".to_string(),
            });
        }

        for (source_id, url) in &self.sources {
            if source_id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    reason: "Source id cannot be empty".to_string(),
                });
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("Source {source_id} must have an http(s) URL, got {url:?}"),
                });
            }
        }
        Ok(())
    }
}
