// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Configuration schema definitions.
//!
//! Defines all configuration structures that can be loaded from modhost.toml.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, HostError, Result};

/// The main configuration structure for the module host.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Discovery, lifecycle and registry settings.
    pub host: HostSettings,

    /// Dependency isolation settings.
    pub isolation: IsolationConfig,
}

impl HostConfig {
    /// Load configuration from the default locations.
    pub fn load() -> Result<Self> {
        super::loader::load_config()
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        super::loader::load_config_from(path)
    }

    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<()> {
        if self.host.max_concurrent_loads == 0 {
            return Err(invalid("host.max_concurrent_loads", "must be at least 1"));
        }
        if let Some(ext) = &self.host.extension {
            if ext.trim_start_matches('.').is_empty() {
                return Err(invalid("host.extension", "cannot be empty"));
            }
        }
        if self.isolation.shared.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("isolation.shared", "identifiers cannot be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> HostError {
    HostError::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    })
}

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Root directory scanned for modules. Created if absent.
    pub directory: Option<PathBuf>,

    /// Module file extension, without the dot. Platform default when unset.
    pub extension: Option<String>,

    /// Initializer timeout in milliseconds (0 disables).
    pub init_timeout_ms: u64,

    /// Shutdown timeout in milliseconds (0 disables).
    pub shutdown_timeout_ms: u64,

    /// How many module files may load at once.
    pub max_concurrent_loads: usize,

    /// What to do when a second module registers an existing name.
    pub on_name_collision: CollisionPolicy,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            directory: None,
            extension: None,
            init_timeout_ms: 30_000,
            shutdown_timeout_ms: 10_000,
            max_concurrent_loads: 1,
            on_name_collision: CollisionPolicy::Replace,
        }
    }
}

impl HostSettings {
    /// Effective module directory.
    pub fn modules_dir(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|d| d.join("modhost").join("modules"))
                .unwrap_or_else(|| PathBuf::from("modules")),
        }
    }

    /// Effective module extension.
    pub fn module_extension(&self) -> String {
        match &self.extension {
            Some(ext) => ext.trim_start_matches('.').to_string(),
            None => std::env::consts::DLL_EXTENSION.to_string(),
        }
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        millis(self.init_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        millis(self.shutdown_timeout_ms)
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Policy for two modules declaring the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Warn, shut down the earlier module and keep the newcomer.
    #[default]
    Replace,
    /// Keep the earlier module and reject the newcomer.
    Reject,
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionPolicy::Replace => write!(f, "replace"),
            CollisionPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Isolation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IsolationConfig {
    /// Dependency identifiers resolved by the host rather than privately.
    pub shared: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.host.init_timeout_ms, 30_000);
        assert_eq!(config.host.max_concurrent_loads, 1);
        assert_eq!(config.host.on_name_collision, CollisionPolicy::Replace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extension_defaults_to_platform() {
        let settings = HostSettings::default();
        assert_eq!(settings.module_extension(), std::env::consts::DLL_EXTENSION);

        let settings = HostSettings {
            extension: Some(".mod".to_string()),
            ..HostSettings::default()
        };
        assert_eq!(settings.module_extension(), "mod");
    }

    #[test]
    fn test_zero_timeout_disables() {
        let settings = HostSettings {
            init_timeout_ms: 0,
            ..HostSettings::default()
        };
        assert!(settings.init_timeout().is_none());
        assert_eq!(settings.shutdown_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = HostConfig::default();
        config.host.max_concurrent_loads = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_loads"));
    }

    #[test]
    fn test_collision_policy_display() {
        assert_eq!(CollisionPolicy::Replace.to_string(), "replace");
        assert_eq!(CollisionPolicy::Reject.to_string(), "reject");
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("init_timeout_ms"));
        assert!(toml_str.contains("on_name_collision"));
    }
}
