use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listener::ReconnectPolicy;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_CATALOG_PAGE_SIZE: usize = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ViewerConfig {
    pub api_base_url: String,
    pub hub_url: String,
    pub default_page_size: usize,
    pub catalog_page_size: usize,
    pub request_timeout_secs: u64,
    pub reconnect_delays_secs: Vec<u64>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5282".to_string(),
            hub_url: "ws://localhost:5282/hubs/notifications".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            catalog_page_size: DEFAULT_CATALOG_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            reconnect_delays_secs: vec![0, 2, 10, 30],
        }
    }
}

impl ViewerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect_delays_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        )
    }

    fn normalize(&mut self) {
        if self.default_page_size == 0 {
            self.default_page_size = DEFAULT_PAGE_SIZE;
        }
        if self.catalog_page_size == 0 {
            self.catalog_page_size = DEFAULT_CATALOG_PAGE_SIZE;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.hub_url = self.hub_url.trim().to_string();
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    config: ViewerConfig,
}

impl FileConfigStore {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                config: ViewerConfig::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                config: ViewerConfig::default(),
            });
        }

        let mut config: ViewerConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.normalize();

        Ok(Self { path, config })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn set_config(&mut self, mut config: ViewerConfig) {
        config.normalize();
        self.config = config;
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.config)
            .map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os("RELVIEW_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("relview").join("config.toml"))
}
