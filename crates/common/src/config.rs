// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Configuration structures for Jump Tunnel

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::RemoteEndpoint;

/// Authentication type for the jump host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// SSH key authentication
    Key,
    /// Password authentication
    Password,
}

/// Complete tunnel configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub jump_host: JumpHostConfig,
    #[serde(default)]
    pub options: TunnelOptions,
    /// Endpoints to resolve as soon as the tunnel is up
    #[serde(default)]
    pub forwards: Vec<RemoteEndpoint>,
}

/// SSH connection to the jump host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpHostConfig {
    /// Jump host hostname or IP
    pub host: String,
    /// SSH server port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH username
    pub user: String,
    /// Authentication type
    pub auth_type: AuthType,
    /// Path to SSH private key (for key auth)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

/// Tunnel behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelOptions {
    /// First local port tried when allocating a forward
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// SSH keepalive interval in seconds (0 = disabled)
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    /// Maximum SSH packet size in bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
    /// SSH window size in bytes
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    /// Path to the known_hosts file used to verify the jump host
    #[serde(default = "default_known_hosts_path")]
    pub known_hosts_path: PathBuf,
    /// Record unknown host keys instead of rejecting them
    #[serde(default)]
    pub accept_unknown_hosts: bool,
}

// Default value functions
fn default_ssh_port() -> u16 {
    22
}

fn default_port_range_start() -> u16 {
    1025
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_keepalive() -> u64 {
    30
}

fn default_max_packet_size() -> u32 {
    65535
}

fn default_window_size() -> u32 {
    2097152 // 2 MiB
}

fn default_known_hosts_path() -> PathBuf {
    config_dir().join("known_hosts")
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jump-tunnel")
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            port_range_start: default_port_range_start(),
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive(),
            max_packet_size: default_max_packet_size(),
            window_size: default_window_size(),
            known_hosts_path: default_known_hosts_path(),
            accept_unknown_hosts: false,
        }
    }
}

impl TunnelOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        match self.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl TunnelConfig {
    /// Default location: <config_dir>/jump-tunnel/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("jump-tunnel").join("config.toml"))
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        info!("Loaded tunnel configuration from: {}", path.display());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let jump_host = &self.jump_host;
        if jump_host.host.is_empty() {
            return Err(Error::Config("Host cannot be empty".to_string()));
        }
        if jump_host.user.is_empty() {
            return Err(Error::Config("User cannot be empty".to_string()));
        }
        if jump_host.port == 0 {
            return Err(Error::Config("Port must be greater than 0".to_string()));
        }
        if jump_host.auth_type == AuthType::Key && jump_host.key_path.is_none() {
            return Err(Error::Config(
                "Key path required for key authentication".to_string(),
            ));
        }
        if self.options.port_range_start == 0 {
            return Err(Error::Config(
                "Port range start must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
