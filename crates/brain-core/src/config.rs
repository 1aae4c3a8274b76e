//! brain.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub storage: StorageConfig,
    pub state: StateConfig,
    pub server: ServerConfig,
}

/// Where the state database lives and who is writing to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Recorded as `updated_by` in entry metadata.
    pub writer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub default_list_limit: usize,
    pub max_list_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            path: Some(PathBuf::from("data/brain/state.redb")),
            writer: "brain".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            default_list_limit: 20,
            max_list_limit: 500,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 9998,
        }
    }
}

impl BrainConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrainConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl StorageConfig {
    /// Ephemeral storage with the default writer name.
    pub fn in_memory() -> Self {
        StorageConfig {
            path: None,
            ..Default::default()
        }
    }
}

impl StateConfig {
    /// Resolve a caller-requested list limit against the configured bounds.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_list_limit)
            .min(self.max_list_limit)
    }
}
