//! Engine configuration loaded from YAML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration or rule files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
    #[error("duplicate rule {0}")]
    DuplicateRule(String),
}

/// Retry policy for index sink failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Attempts after the first before an event is dead-lettered
    pub max_retries: u32,
    /// Attempt `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 250,
        }
    }
}

impl SinkConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: usize,
    pub max_walk_depth: usize,
    pub max_propagation_depth: usize,
    pub sink: SinkConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_walk_depth: 32,
            max_propagation_depth: 8,
            sink: SinkConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// `$XDG_CONFIG_HOME/degraph/config.yaml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("degraph").join("config.yaml"))
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.max_walk_depth == 0 {
            return Err(ConfigError::Invalid("max_walk_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.sink = SinkConfig {
            max_retries,
            retry_delay_ms,
        };
        self
    }
}
