//! Process configuration
//!
//! Everything is read once at startup. The relay settings come from a TOML
//! file; build targets can be listed inline under `[targets.<key>]` or in a
//! separate `targets_file` (YAML or TOML).

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};
use crate::targets::BuildTargetConfig;

pub const DEFAULT_CONFIG_PATH: &str = "relay_config.toml";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8889";
pub const DEFAULT_NOTIFY_PATH: &str = "/notify";
pub const DEFAULT_BUILD_HOST: &str = "http://localhost:8080";
pub const DEFAULT_BUILD_NOTIFY_URL: &str = "/job/<project>/build?token=<token>";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub jenkins: NotifierSettings,
    pub dispatch: DispatchConfig,
    /// External build target table, merged with `targets`
    pub targets_file: Option<PathBuf>,
    pub targets: HashMap<String, BuildTargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub notify_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            notify_path: DEFAULT_NOTIFY_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Default build server connection, used for every target that does not
/// carry a complete dedicated server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub host: String,
    pub notify_url: String,
    pub username: String,
    pub api_token: String,
    /// No timeout beyond the client default when unset
    pub request_timeout_secs: Option<u64>,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_BUILD_HOST.to_string(),
            notify_url: DEFAULT_BUILD_NOTIFY_URL.to_string(),
            username: String::new(),
            api_token: String::new(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.notify_path.starts_with('/') {
            return Err(RelayError::ConfigError(format!(
                "notify_path must start with '/', got '{}'",
                self.server.notify_path
            )));
        }
        if self.dispatch.workers == 0 {
            return Err(RelayError::ConfigError(
                "dispatch.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(RelayError::ConfigError(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and parse the configuration file, pulling in the targets file if
/// one is named. A relative `targets_file` is resolved against the
/// directory of the configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        RelayError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut config: RelayConfig = toml::from_str(&config_str).map_err(|e| {
        RelayError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    if let Some(targets_file) = &config.targets_file {
        let targets_path = match path.parent() {
            Some(dir) if targets_file.is_relative() => dir.join(targets_file),
            _ => targets_file.clone(),
        };
        let external = load_targets_file(&targets_path)?;
        for (key, target) in external {
            if config.targets.contains_key(&key) {
                return Err(RelayError::ConfigError(format!(
                    "Build target '{}' is defined both inline and in '{}'",
                    key,
                    targets_path.display()
                )));
            }
            config.targets.insert(key, target);
        }
    }

    config.validate()?;
    Ok(config)
}

/// Read a build target table. `.yaml` and `.yml` files are YAML, anything
/// else is TOML.
pub fn load_targets_file(path: impl AsRef<Path>) -> Result<HashMap<String, BuildTargetConfig>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let targets = if is_yaml {
        serde_yaml::from_str::<Option<HashMap<String, BuildTargetConfig>>>(&content)?
            .unwrap_or_default()
    } else {
        toml::from_str(&content)?
    };

    Ok(targets)
}
