// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Structs used to configure the decoder and the `pnrsi` command line application.
//!
//! Typically instantiated using `serde_yaml`.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const DEFAULT_CONFIG_STR: &str = include_str!("../etc/example-config.yml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log: LogConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Decode every PDU through the security envelope entry point.
    #[serde(default)]
    pub secured: bool,
    #[serde(default = "default_reassemble")]
    pub reassemble: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            secured: false,
            reassemble: default_reassemble(),
        }
    }
}

fn default_reassemble() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_rfc1006_ports")]
    pub rfc1006_ports: Vec<u16>,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_frames: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rfc1006_ports: default_rfc1006_ports(),
            max_frames: 0,
        }
    }
}

fn default_rfc1006_ports() -> Vec<u16> {
    vec![crate::constants::RFC1006_PORT]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub show_tree: bool,
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml_str(&contents),
            Err(e) => {
                warn!("could not open config ({e}), using default config");
                Self::from_yaml_str(DEFAULT_CONFIG_STR)
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.rfc1006_ports.is_empty() {
            return Err(ConfigError::Invalid(
                "capture.rfc1006_ports must list at least one port".into(),
            ));
        }
        if self.capture.rfc1006_ports.contains(&0) {
            return Err(ConfigError::Invalid(
                "capture.rfc1006_ports must not contain port 0".into(),
            ));
        }

        Ok(())
    }
}
