// src/config/loader.rs
//! Layered TOML configuration loader
//!
//! Built-in defaults are merged with each existing file in order (later files
//! win key by key), then optional environment overrides, then the merged
//! document is deserialized and validated.

use crate::config::{constants::paths, SystemConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Separator between table levels in override variable names
const ENV_PATH_SEPARATOR: &str = "__";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error("Configuration validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: Option<String>,
    current: SystemConfig,
}

impl ConfigLoader {
    /// Loader over the conventional `config/default.toml` and `config/local.toml`
    pub fn new() -> Self {
        Self::with_paths(vec![
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ])
    }

    /// Create loader with custom paths, lowest precedence first
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: None,
            current: SystemConfig::default(),
        }
    }

    /// Also apply `<PREFIX>SECTION__KEY=value` environment overrides
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load, merge and validate
    pub fn load(&mut self) -> Result<SystemConfig, ConfigError> {
        let mut merged = self.load_and_merge()?;

        if let Some(prefix) = &self.env_prefix {
            apply_overrides(&mut merged, prefix, std::env::vars());
        }

        let config = finish(merged)?;
        info!(
            mode = %config.acquisition.mode,
            sample_rate_hz = config.acquisition.sample_rate_hz,
            port = %config.serial.port_name,
            "configuration loaded"
        );
        self.current = config.clone();
        Ok(config)
    }

    /// Most recently loaded configuration, or the defaults
    pub fn current(&self) -> &SystemConfig {
        &self.current
    }

    /// Validate a single file on top of the defaults without loading it
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut merged = defaults_value()?;
        merge_toml_values(&mut merged, load_config_file(path)?);
        finish(merged).map(|_| ())
    }

    /// Write the current configuration as TOML
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml_content =
            toml::to_string_pretty(&self.current).map_err(|e| ConfigError::Parse(e.to_string()))?;

        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn load_and_merge(&self) -> Result<toml::Value, ConfigError> {
        let mut merged = defaults_value()?;

        for config_path in &self.config_paths {
            if config_path.exists() {
                debug!(path = %config_path.display(), "merging configuration file");
                merge_toml_values(&mut merged, load_config_file(config_path)?);
            }
        }

        Ok(merged)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SystemConfig::default()).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn finish(merged: toml::Value) -> Result<SystemConfig, ConfigError> {
    let config: SystemConfig = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse(format!("Failed to deserialize config: {}", e)))?;
    config.validate().map_err(ConfigError::Validation)?;
    Ok(config)
}

fn load_config_file<P: AsRef<Path>>(path: P) -> Result<toml::Value, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: toml::Value = toml::from_str(&content)?;

    Ok(config)
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

/// `EMG_SERIAL__PORT_NAME=/dev/ttyACM0` sets `serial.port_name`
fn apply_overrides<I>(config: &mut toml::Value, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(path) = key.strip_prefix(prefix) else {
            continue;
        };
        let path = path.to_lowercase();
        let parts: Vec<&str> = path.split(ENV_PATH_SEPARATOR).filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            continue;
        }
        debug!(variable = %key, "applying environment override");
        set_nested_value(config, &parts, parse_env_value(&value));
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn set_nested_value(config: &mut toml::Value, parts: &[&str], value: toml::Value) {
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = config;
    for part in parents {
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()));
    }

    if let toml::Value::Table(table) = current {
        table.insert(last.to_string(), value);
    }
}
