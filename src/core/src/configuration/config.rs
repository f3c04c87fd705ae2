use super::types::*;
use crate::error_handling::types::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Runtime configuration of the sensor agent.
///
/// Loaded from a TOML file; every section and every key is optional and falls
/// back to the values the sensor has always shipped with, so an empty file is
/// a valid configuration.
///
/// # Fields Overview
///
/// - `interfaces`: monitored interfaces, one capture producer each
/// - `storage`: primary and backup capture directories and their permissions
/// - `capture`: packets per file, capture tool, blocking pool size, restart policy
/// - `transfer`: retry budget, endpoint path and scheme, optional queue bound
/// - `retention`: sweep interval and per-directory age thresholds
///
/// # Example
///
/// ```toml
/// interfaces = ["enp0s8", "enp0s9"]
///
/// [storage]
/// capture_dir = "/var/lib/sniffhawk/pcaps"
/// backup_dir = "/var/lib/sniffhawk/backup"
///
/// [transfer]
/// secure = true
/// ```
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interfaces: Vec<String>,
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub transfer: TransferConfig,
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interfaces: vec![
                String::from("enp0s8"),
                String::from("enp0s9"),
                String::from("enp0s10"),
            ],
            storage: StorageConfig::default(),
            capture: CaptureConfig::default(),
            transfer: TransferConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Config {
    /// Reads, parses and validates the configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::InterfacesEmpty(String::from(
                "at least one interface must be monitored",
            )));
        }

        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if iface.trim().is_empty() {
                return Err(ConfigError::InterfacesEmpty(String::from(
                    "interface names cannot be blank",
                )));
            }
            if !seen.insert(iface.as_str()) {
                return Err(ConfigError::DuplicateInterface(iface.clone()));
            }
        }

        if self.storage.capture_dir == self.storage.backup_dir {
            return Err(ConfigError::DirectoryConflict(format!(
                "capture and backup directories are both {}",
                self.storage.capture_dir.display()
            )));
        }

        if self.storage.directory_mode > 0o7777 {
            return Err(ConfigError::NotInRange(format!(
                "directory_mode {:o} is not a permission mode",
                self.storage.directory_mode
            )));
        }

        if self.capture.packet_count == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "capture.packet_count must be at least 1",
            )));
        }

        if self.capture.blocking_threads == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "capture.blocking_threads must be at least 1",
            )));
        }

        if self.transfer.max_attempts == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "transfer.max_attempts must be at least 1",
            )));
        }

        if self.transfer.connect_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "transfer.connect_timeout_secs must be at least 1",
            )));
        }

        if self.transfer.queue_capacity == Some(0) {
            return Err(ConfigError::NotInRange(String::from(
                "transfer.queue_capacity must be at least 1 when set",
            )));
        }

        if self.retention.sweep_interval_secs == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "retention.sweep_interval_secs must be at least 1",
            )));
        }

        Ok(())
    }

    /// The two retention rules: primary capture directory and backup directory.
    pub fn retention_rules(&self) -> Vec<RetentionRule> {
        vec![
            RetentionRule::from_minutes(
                self.storage.capture_dir.clone(),
                self.retention.capture_max_age_minutes,
            ),
            RetentionRule::from_minutes(
                self.storage.backup_dir.clone(),
                self.retention.backup_max_age_minutes,
            ),
        ]
    }
}
