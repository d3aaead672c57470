// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - CLI Client
// Opens a tunnel through the jump host and prints the local address for each endpoint

mod config;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use dialoguer::Password;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

use jump_tunnel::{SshConnector, TunnelConnection};
use jump_tunnel_common::{
    format_host_port, AuthType, JumpHostConfig, LocalBinding, RemoteEndpoint, TunnelConfig,
};

const PASSWORD_ENV: &str = "JUMP_TUNNEL_PASSWORD";
const PASSPHRASE_ENV: &str = "JUMP_TUNNEL_KEY_PASSPHRASE";

#[derive(Parser)]
#[command(name = "jump-tunnel")]
#[command(about = "Reach remote endpoints through an SSH jump host", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward endpoints through the jump host until Ctrl-C
    Resolve {
        /// Remote endpoints as host:port (in addition to configured forwards)
        endpoints: Vec<RemoteEndpoint>,

        /// Print the address mapping as JSON
        #[arg(long)]
        json: bool,

        /// Override the first local port tried
        #[arg(long)]
        port_range_start: Option<u16>,
    },

    /// Validate the configuration file and print it
    CheckConfig,
}

#[derive(Debug, Serialize)]
struct ResolvedAddress {
    remote: RemoteEndpoint,
    local: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = config::resolve_path(cli.config)?;
    debug!("Using configuration file {}", config_path.display());

    match cli.command {
        Commands::Resolve {
            endpoints,
            json,
            port_range_start,
        } => {
            let config = config::load(&config_path)?;
            run_resolve(config, endpoints, json, port_range_start).await
        }
        Commands::CheckConfig => check_config(&config_path),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "jump_tunnel=debug,jump_tunnel_cli=debug"
    } else {
        "jump_tunnel=info,jump_tunnel_cli=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_resolve(
    config: TunnelConfig,
    extra: Vec<RemoteEndpoint>,
    json: bool,
    port_range_start: Option<u16>,
) -> Result<()> {
    let endpoints = config::merge_endpoints(&config, &extra);
    if endpoints.is_empty() {
        bail!("No endpoints to resolve. Pass host:port arguments or add `forwards` to the config");
    }

    let start = port_range_start.unwrap_or(config.options.port_range_start);
    let connector = build_connector(&config)?;

    info!("Connecting to jump host {}", jump_host_label(&config.jump_host));
    let tunnel = TunnelConnection::open(connector, start)
        .await
        .context("Failed to open tunnel")?;

    let mut resolved = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        match tunnel.resolve(&endpoint).await {
            Ok(binding) => resolved.push((endpoint, binding)),
            Err(e) => {
                tunnel.close().await;
                return Err(e).with_context(|| format!("Failed to resolve {}", endpoint));
            }
        }
    }

    if json {
        print_json(&resolved)?;
    } else {
        print_table(&resolved);
        println!();
        println!("{}", "Tunnel is up. Press Ctrl-C to close it.".green().bold());
    }

    let wait = tokio::signal::ctrl_c().await;
    info!("Closing tunnel {}", tunnel.id());
    tunnel.close().await;
    wait.context("Failed to listen for Ctrl-C")?;

    if !json {
        println!("{}", "Tunnel closed".yellow());
    }
    Ok(())
}

fn build_connector(config: &TunnelConfig) -> Result<SshConnector> {
    let connector = SshConnector::new(config.jump_host.clone(), config.options.clone());

    let connector = match config.jump_host.auth_type {
        AuthType::Password => {
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(value) => Zeroizing::new(value),
                Err(_) => Zeroizing::new(
                    Password::new()
                        .with_prompt(format!(
                            "Password for {}@{}",
                            config.jump_host.user, config.jump_host.host
                        ))
                        .interact()
                        .context("Failed to read password")?,
                ),
            };
            connector.with_password(password)
        }
        AuthType::Key => match std::env::var(PASSPHRASE_ENV) {
            Ok(value) => connector.with_passphrase(Zeroizing::new(value)),
            Err(_) => connector,
        },
    };

    Ok(connector)
}

fn jump_host_label(jump_host: &JumpHostConfig) -> String {
    format!(
        "{}@{}",
        jump_host.user,
        format_host_port(&jump_host.host, jump_host.port)
    )
}

fn print_table(resolved: &[(RemoteEndpoint, LocalBinding)]) {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Remote").add_attribute(Attribute::Bold).fg(Color::Cyan),
            Cell::new("Local").add_attribute(Attribute::Bold).fg(Color::Cyan),
        ]);

    for (remote, binding) in resolved {
        table.add_row(vec![
            Cell::new(remote.to_string()),
            Cell::new(binding.address()).fg(Color::Green),
        ]);
    }

    println!("{table}");
}

fn print_json(resolved: &[(RemoteEndpoint, LocalBinding)]) -> Result<()> {
    let rows: Vec<ResolvedAddress> = resolved
        .iter()
        .map(|(remote, binding)| ResolvedAddress {
            remote: remote.clone(),
            local: binding.address(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn check_config(path: &std::path::Path) -> Result<()> {
    let config = config::load(path)?;

    println!("{} {}", "Configuration OK:".green().bold(), path.display());
    println!();
    println!("  Jump host:       {}", jump_host_label(&config.jump_host));
    println!("  Auth:            {:?}", config.jump_host.auth_type);
    if let Some(key_path) = &config.jump_host.key_path {
        println!("  Key:             {}", key_path.display());
    }
    println!("  Port range:      {}-65535", config.options.port_range_start);
    println!("  Connect timeout: {}s", config.options.connect_timeout_secs);
    println!("  Known hosts:     {}", config.options.known_hosts_path.display());

    if config.forwards.is_empty() {
        println!("  Forwards:        {}", "(none)".dimmed());
    } else {
        println!("  Forwards:");
        for endpoint in &config.forwards {
            println!("    - {}", endpoint);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_parses_endpoints() {
        let cli = Cli::try_parse_from([
            "jump-tunnel",
            "resolve",
            "10.0.0.5:443",
            "[::1]:8080",
            "--port-range-start",
            "20000",
        ])
        .unwrap();

        match cli.command {
            Commands::Resolve {
                endpoints,
                json,
                port_range_start,
            } => {
                assert_eq!(
                    endpoints,
                    vec![RemoteEndpoint::new("10.0.0.5", 443), RemoteEndpoint::new("::1", 8080)]
                );
                assert!(!json);
                assert_eq!(port_range_start, Some(20000));
            }
            Commands::CheckConfig => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_resolve_rejects_bad_endpoint() {
        assert!(Cli::try_parse_from(["jump-tunnel", "resolve", "no-port-here"]).is_err());
    }

    #[test]
    fn test_json_rows_use_localhost_address() {
        let row = ResolvedAddress {
            remote: RemoteEndpoint::new("10.0.0.5", 443),
            local: LocalBinding::new(1025).address(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["remote"], "10.0.0.5:443");
        assert_eq!(value["local"], "localhost:1025");
    }

    #[test]
    fn test_jump_host_label() {
        let jump_host = JumpHostConfig {
            host: "bastion.example.com".to_string(),
            port: 2222,
            user: "deploy".to_string(),
            auth_type: AuthType::Key,
            key_path: None,
        };
        assert_eq!(jump_host_label(&jump_host), "deploy@bastion.example.com:2222");

        let v6 = JumpHostConfig {
            host: "fd00::1".to_string(),
            port: 22,
            ..jump_host
        };
        assert_eq!(jump_host_label(&v6), "deploy@[fd00::1]:22");
    }
}
