use crate::control::LoggerBinding;
use crate::error::{LogCtlError, Result};
use crate::logging::Level;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default socket path for controller communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/logctl.sock";

/// One `[[targets]]` entry: a logger name and a level string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    #[serde(default = "default_target_level")]
    pub level: String,
}

impl TargetSpec {
    /// Parse into a binding; fails on a malformed level
    pub fn to_binding(&self) -> Result<LoggerBinding> {
        LoggerBinding::parse(&self.name, &self.level)
    }
}

/// Result of checking a logger name entered by an administrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameCheck {
    Ok,
    Warning(String),
}

/// Check a target's logger name; an empty name is allowed but warned about
/// since it addresses the root logger
pub fn check_target_name(name: &str) -> NameCheck {
    if name.trim().is_empty() {
        NameCheck::Warning("Name is mandatory".to_string())
    } else {
        NameCheck::Ok
    }
}

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Unix socket the controller listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Console filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Extra uids allowed to run administrative commands
    #[serde(default)]
    pub admin_uids: Vec<u32>,

    /// Console targets applied at startup
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_target_level() -> String {
    "FINE".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_filter: default_log_filter(),
            admin_uids: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load controller settings from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<ControllerConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LogCtlError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: ControllerConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| LogCtlError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| LogCtlError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(LogCtlError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.socket_path = expand_env_in_path(&config.socket_path);
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(LogCtlError::ConfigValidationError(
                "socket_path must not be empty".to_string(),
            ));
        }

        for target in &self.targets {
            Level::parse(&target.level).map_err(|e| {
                LogCtlError::ConfigValidationError(format!("target '{}': {}", target.name, e))
            })?;
            if let NameCheck::Warning(msg) = check_target_name(&target.name) {
                tracing::warn!("Target with level {}: {}", target.level, msg);
            }
        }

        Ok(())
    }

    /// Startup targets as bindings
    pub fn bindings(&self) -> Result<Vec<LoggerBinding>> {
        self.targets.iter().map(TargetSpec::to_binding).collect()
    }
}

/// Expand $VAR and ${VAR} references in a string
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    for (key, value) in std::env::vars() {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}
