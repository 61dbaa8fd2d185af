//! TOML configuration for the verifier services and tracing setup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verifier_resolver::ReadMode;
use verifier_tasks::TaskManagerConfig;

mod byte_size;
mod logging;

pub use byte_size::{ByteSize, ParseByteSizeError};
pub use logging::{init_tracing, LoggingConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Applied to every IDE, JDK and plugin resolver the service builds.
    #[serde(default)]
    pub read_mode: ReadMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Opened JDK resolvers kept around when unused.
    #[serde(default = "CacheConfig::default_jdk_cache_size")]
    pub jdk_cache_size: usize,
    #[serde(default = "CacheConfig::default_ide_cache_size")]
    pub ide_cache_size: usize,
}

impl CacheConfig {
    fn default_jdk_cache_size() -> usize {
        3
    }

    fn default_ide_cache_size() -> usize {
        5
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            jdk_cache_size: Self::default_jdk_cache_size(),
            ide_cache_size: Self::default_ide_cache_size(),
        }
    }
}

/// Where the plugin repository fetches files it does not have yet.
///
/// Written as a single string: `http://` and `https://` values are URL
/// templates (with an optional `{name}` placeholder), anything else is a
/// local directory to copy from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RepositorySource {
    Directory(PathBuf),
    Url(String),
}

impl From<String> for RepositorySource {
    fn from(value: String) -> Self {
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            RepositorySource::Url(value)
        } else {
            RepositorySource::Directory(PathBuf::from(value))
        }
    }
}

impl From<RepositorySource> for String {
    fn from(source: RepositorySource) -> Self {
        match source {
            RepositorySource::Directory(path) => path.display().to_string(),
            RepositorySource::Url(url) => url,
        }
    }
}

impl fmt::Display for RepositorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositorySource::Directory(path) => write!(f, "directory {}", path.display()),
            RepositorySource::Url(url) => write!(f, "url {url}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    #[serde(default = "RepositoryConfig::default_directory")]
    pub directory: PathBuf,
    /// Disk space the downloaded files may take.
    #[serde(default = "RepositoryConfig::default_quota")]
    pub quota: ByteSize,
    #[serde(default)]
    pub source: Option<RepositorySource>,
}

impl RepositoryConfig {
    fn default_directory() -> PathBuf {
        std::env::temp_dir().join("verifier").join("plugins")
    }

    fn default_quota() -> ByteSize {
        ByteSize(5 << 30)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            directory: Self::default_directory(),
            quota: Self::default_quota(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Worker threads per task type.
    #[serde(default = "TasksConfig::default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub concurrency_overrides: BTreeMap<String, usize>,
    #[serde(default = "TasksConfig::default_history_limit")]
    pub history_limit: usize,
    /// Seconds to wait for running tasks on shutdown before cancelling them.
    #[serde(default = "TasksConfig::default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl TasksConfig {
    fn default_concurrency() -> usize {
        4
    }

    fn default_history_limit() -> usize {
        128
    }

    fn default_shutdown_timeout() -> u64 {
        60
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    pub fn manager_config(&self) -> TaskManagerConfig {
        TaskManagerConfig {
            concurrency: self.concurrency,
            concurrency_overrides: self
                .concurrency_overrides
                .iter()
                .map(|(name, threads)| (name.clone(), *threads))
                .collect(),
            history_limit: self.history_limit,
            ..TaskManagerConfig::default()
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            concurrency: Self::default_concurrency(),
            concurrency_overrides: BTreeMap::new(),
            history_limit: Self::default_history_limit(),
            shutdown_timeout: Self::default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory whose subdirectories are IDE builds.
    #[serde(default)]
    pub ides_dir: Option<PathBuf>,
    #[serde(default)]
    pub jdk_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config value `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The `Display` form embeds a snippet of the source text; keep only the message.
        ConfigError::Toml(err.message().to_string())
    }
}

impl VerifierConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: VerifierConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(key: impl Into<String>, value: usize) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key: key.into(),
                    reason: "must be at least 1".to_string(),
                });
            }
            Ok(())
        }

        positive("cache.jdk_cache_size", self.cache.jdk_cache_size)?;
        positive("cache.ide_cache_size", self.cache.ide_cache_size)?;
        positive("tasks.concurrency", self.tasks.concurrency)?;
        positive("tasks.history_limit", self.tasks.history_limit)?;
        for (task_type, threads) in &self.tasks.concurrency_overrides {
            positive(format!("tasks.concurrency_overrides.{task_type}"), *threads)?;
        }
        if self.repository.quota.bytes() == 0 {
            return Err(ConfigError::Invalid {
                key: "repository.quota".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
