use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::storage::StorageError;

pub const API_URL_ENV: &str = "ITG_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Base URL of the ITG Collect API, including the `/api` prefix
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// How long a fetched entry collection is served without refetching
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Where queued submissions, drafts and the session are stored
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://itg-collect-api.enhanceable.io/api".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            data_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Failed to access config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl CollectConfig {
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("itg-collect")
            .join("config.toml"))
    }

    /// Load config from disk, falling back to defaults when the file is missing.
    /// The `ITG_API_URL` environment variable overrides `api_url`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::from_toml_file(path)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }

        Ok(config)
    }

    fn from_toml_file(path: PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()?;
        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(&path, raw).map_err(io_err)?;
        Ok(path)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::seconds(self.cache_ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn data_dir(&self) -> Result<PathBuf, StorageError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .ok_or(StorageError::NoDataDir)?
                .join("itg-collect")),
        }
    }
}
