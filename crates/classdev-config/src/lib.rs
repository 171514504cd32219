//! Configuration management for classdev
//!
//! Holds the location of the device-class tree, the notification tick interval
//! and any named device queries. Configuration is plain TOML and is owned by
//! the caller: it is loaded once and handed to the resolver and scheduler,
//! never stored in a global.

mod devices;

pub use devices::{Constraint, DeviceSpec};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration directory
pub const CONFIG_DIR: &str = "/etc/classdev";

/// Where the host exposes its device classes
pub const DEFAULT_CLASS_ROOT: &str = "/sys/class";

/// Default period of the notification timer, in milliseconds.
///
/// Every tick re-reads the attributes the pending predicates look at, so this
/// trades wake-up latency against read syscalls.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Main classdev configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalConfig {
    /// Root of the device-class tree. Point this at a fake tree for testing.
    #[serde(default = "default_class_root")]
    pub class_root: PathBuf,

    /// Notification timer period in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Named device queries
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSpec>,
}

fn default_class_root() -> PathBuf {
    PathBuf::from(DEFAULT_CLASS_ROOT)
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            class_root: default_class_root(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            devices: BTreeMap::new(),
        }
    }
}

impl HalConfig {
    /// Configuration rooted at `class_root`, everything else default
    pub fn with_class_root(class_root: impl Into<PathBuf>) -> Self {
        Self {
            class_root: class_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        let system_config = Path::new(CONFIG_DIR).join("config.toml");
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Notification timer period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Look up a named device query
    pub fn device(&self, name: &str) -> Option<&DeviceSpec> {
        self.devices.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        for (name, spec) in &self.devices {
            if spec.class.is_empty() || spec.class.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "device '{}' has an invalid class name '{}'",
                    name, spec.class
                )));
            }
        }
        Ok(())
    }
}
