// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - CLI Config Module
// Locates and loads the tunnel configuration file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use jump_tunnel_common::{RemoteEndpoint, TunnelConfig};

/// Use the explicit path if given, otherwise the default location
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path)),
        None => TunnelConfig::default_path().context("Could not determine config file location"),
    }
}

/// Load, validate and expand `~` in the key path
pub fn load(path: &Path) -> Result<TunnelConfig> {
    let mut config = TunnelConfig::load_from(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(key_path) = config.jump_host.key_path.take() {
        config.jump_host.key_path = Some(expand(&key_path));
    }
    config.options.known_hosts_path = expand(&config.options.known_hosts_path);

    Ok(config)
}

/// Configured forwards followed by command-line ones, duplicates removed
pub fn merge_endpoints(config: &TunnelConfig, extra: &[RemoteEndpoint]) -> Vec<RemoteEndpoint> {
    let mut endpoints: Vec<RemoteEndpoint> = Vec::new();
    for endpoint in config.forwards.iter().chain(extra) {
        if !endpoints.contains(endpoint) {
            endpoints.push(endpoint.clone());
        }
    }
    endpoints
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_expands_tilde() {
        let file = write_config(
            r#"
            [jump_host]
            host = "bastion.example.com"
            user = "deploy"
            auth_type = "key"
            key_path = "~/.ssh/id_ed25519"
            "#,
        );

        let config = load(file.path()).unwrap();
        let key_path = config.jump_host.key_path.unwrap();
        assert!(!key_path.to_string_lossy().starts_with('~'));
        assert!(key_path.ends_with(".ssh/id_ed25519"));
    }

    #[test]
    fn test_merge_endpoints_dedupes_in_order() {
        let file = write_config(
            r#"
            forwards = ["10.0.0.5:443", "10.0.0.6:443"]

            [jump_host]
            host = "bastion.example.com"
            user = "deploy"
            auth_type = "password"
            "#,
        );
        let config = load(file.path()).unwrap();

        let merged = merge_endpoints(
            &config,
            &[
                RemoteEndpoint::new("10.0.0.6", 443),
                RemoteEndpoint::new("db.internal", 5432),
            ],
        );
        assert_eq!(
            merged,
            vec![
                RemoteEndpoint::new("10.0.0.5", 443),
                RemoteEndpoint::new("10.0.0.6", 443),
                RemoteEndpoint::new("db.internal", 5432),
            ]
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_path(Some(PathBuf::from("/etc/jump-tunnel.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/jump-tunnel.toml"));
    }
}
