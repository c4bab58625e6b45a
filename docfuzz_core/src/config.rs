use crate::executor::{CommandEngineConfig, InputDelivery};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "docfuzz.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no testee command configured; set `engine.command` or pass --engine-cmd")]
    MissingCommand,
    #[error("timeout-ms must be greater than zero")]
    ZeroTimeout,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigInputDelivery {
    #[default]
    StdIn,
    File {
        template: String,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub input_delivery: ConfigInputDelivery,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            input_delivery: ConfigInputDelivery::default(),
            timeout_ms: default_timeout_ms(),
            working_dir: None,
        }
    }
}

impl EngineSettings {
    pub fn to_command_config(&self) -> Result<CommandEngineConfig, ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let input_delivery = match &self.input_delivery {
            ConfigInputDelivery::StdIn => InputDelivery::StdIn,
            ConfigInputDelivery::File { template } => InputDelivery::File(template.clone()),
        };
        Ok(CommandEngineConfig {
            command: self.command.clone(),
            input_delivery,
            timeout: Duration::from_millis(self.timeout_ms),
            working_dir: self.working_dir.clone(),
        })
    }
}

pub fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DocfuzzConfig {
    /// Fallback tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl DocfuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: DocfuzzConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}

impl Default for DocfuzzConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            engine: EngineSettings::default(),
        }
    }
}
