//! Relay configuration loaded from `relay.toml` (or `$RELAY_CONFIG`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RelayError;

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";
/// Config file looked up in the working directory when `RELAY_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Relay configuration (TOML).
///
/// Every field has a default so the file is optional. Values here tune how
/// the backend is reached; what to build comes from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub aws: AwsConfig,
    pub instance: InstanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AwsConfig {
    /// CLI binary used for backend calls.
    pub program: String,
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Upper bound on a single backend call.
    pub command_timeout_secs: u64,
    /// Keep at most this many bytes of CLI stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            region: None,
            profile: None,
            command_timeout_secs: 120,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl AwsConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceConfig {
    pub instance_type: String,
    pub key_name: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_type: "t2.micro".to_string(),
            key_name: None,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.aws.program.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "aws.program must be non-empty".to_string(),
            ));
        }
        if self.aws.command_timeout_secs == 0 {
            return Err(RelayError::InvalidConfig(
                "aws.command_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.aws.output_limit_bytes == 0 {
            return Err(RelayError::InvalidConfig(
                "aws.output_limit_bytes must be > 0".to_string(),
            ));
        }
        if self.instance.instance_type.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "instance.instance_type must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Path to read config from: the explicit override, else `relay.toml` in `cwd`.
pub fn config_path(explicit: Option<&str>, cwd: &Path) -> PathBuf {
    match explicit {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => cwd.join(DEFAULT_CONFIG_FILE),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RelayConfig::default()`.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = RelayConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RelayConfig = toml::from_str(&contents)
        .map_err(|err| RelayError::InvalidConfig(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}
