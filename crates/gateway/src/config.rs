// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration.
//!
//! Loaded from a TOML or JSON file (chosen by extension), or from `SG_*`
//! environment variables when no file is given. Shuttle and stock maps are
//! ordered so "first configured shuttle" is deterministic.

use sg_core::ShuttleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported config format: {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
}

/// One configured shuttle endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuttleEndpoint {
    pub host: String,
    /// Port the gateway dials to send commands.
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    /// Port the shuttle sends from. Informational; inbound links arrive on
    /// the gateway's listener port.
    #[serde(default = "default_response_port")]
    pub response_port: u16,
    #[serde(default = "default_endpoint_health_interval")]
    pub shuttle_health_check_interval: u64,
}

impl ShuttleEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            command_port: default_command_port(),
            response_port: default_response_port(),
            shuttle_health_check_interval: default_endpoint_health_interval(),
        }
    }

    sg_core::setters! {
        set {
            command_port: u16,
            response_port: u16,
        }
    }
}

/// WMS API access, enabling the poll loop when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsConfig {
    pub api_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Log level and optional file output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file_path: None }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub shuttles: BTreeMap<ShuttleId, ShuttleEndpoint>,
    /// Stock name → shuttles able to serve it, in preference order.
    pub stock_to_shuttle: BTreeMap<String, Vec<ShuttleId>>,
    pub wms: Option<WmsConfig>,
    pub logging: LoggingConfig,
    pub command_queue_max_size: usize,
    pub command_processor_workers: usize,
    pub tcp_connect_timeout: f64,
    pub tcp_read_timeout: f64,
    pub tcp_write_timeout: f64,
    pub shuttle_listener_port: u16,
    pub shuttle_health_check_interval: u64,
    pub state_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            shuttles: BTreeMap::new(),
            stock_to_shuttle: BTreeMap::new(),
            wms: None,
            logging: LoggingConfig::default(),
            command_queue_max_size: 1000,
            command_processor_workers: 2,
            tcp_connect_timeout: 5.0,
            tcp_read_timeout: 20.0,
            tcp_write_timeout: 5.0,
            shuttle_listener_port: 8181,
            shuttle_health_check_interval: 30,
            state_dir: PathBuf::from("./state"),
        }
    }
}

impl GatewayConfig {
    /// Load from a file when given, else from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_from_env(),
        }
    }

    /// Load from a TOML or JSON file, chosen by extension.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .map_err(|source| ConfigError::Toml { path: path.to_path_buf(), source }),
            Some("json") => serde_json::from_str(&text)
                .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source }),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Load the scalar settings from `SG_*` environment variables.
    ///
    /// Shuttle and stock maps cannot be expressed in the environment; they
    /// stay empty, which is usable for a gateway that only accepts inbound
    /// links from shuttles it will learn about from a config file later.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        read_env("SG_COMMAND_QUEUE_MAX_SIZE", &mut config.command_queue_max_size)?;
        read_env("SG_COMMAND_PROCESSOR_WORKERS", &mut config.command_processor_workers)?;
        read_env("SG_TCP_CONNECT_TIMEOUT", &mut config.tcp_connect_timeout)?;
        read_env("SG_TCP_READ_TIMEOUT", &mut config.tcp_read_timeout)?;
        read_env("SG_TCP_WRITE_TIMEOUT", &mut config.tcp_write_timeout)?;
        read_env("SG_SHUTTLE_LISTENER_PORT", &mut config.shuttle_listener_port)?;
        read_env(
            "SG_SHUTTLE_HEALTH_CHECK_INTERVAL",
            &mut config.shuttle_health_check_interval,
        )?;
        if let Ok(dir) = std::env::var("SG_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("SG_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(file) = std::env::var("SG_LOG_FILE") {
            config.logging.file_path = Some(PathBuf::from(file));
        }
        if let Ok(api_url) = std::env::var("SG_WMS_API_URL") {
            config.wms = Some(WmsConfig {
                api_url,
                username: std::env::var("SG_WMS_USERNAME").unwrap_or_default(),
                password: std::env::var("SG_WMS_PASSWORD").unwrap_or_default(),
                poll_interval: {
                    let mut interval = default_poll_interval();
                    read_env("SG_WMS_POLL_INTERVAL", &mut interval)?;
                    interval
                },
            });
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tcp_connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tcp_read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tcp_write_timeout)
    }
}

fn read_env<T: std::str::FromStr>(var: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(var) {
        *target = value
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var: var.to_string(), value })?;
    }
    Ok(())
}

fn default_command_port() -> u16 {
    2000
}

fn default_response_port() -> u16 {
    5000
}

fn default_endpoint_health_interval() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    60
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
