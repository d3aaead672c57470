// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - SSH Session
// russh-backed session to the jump host: connect, verify, authenticate and
// open direct-tcpip channels for the forwarders

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, AuthResult, Config, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use jump_tunnel_common::{
    format_host_port, AuthType, Error, JumpHostConfig, RemoteEndpoint, Result, TunnelOptions,
};

use crate::known_hosts::{calculate_fingerprint, KnownHosts, VerifyResult};
use crate::session::{ForwardStream, ForwardingSession, SessionConnector};

/// russh client handler verifying the jump host key
struct ClientHandler {
    host: String,
    port: u16,
    known_hosts_path: PathBuf,
    accept_unknown_hosts: bool,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let mut known_hosts = KnownHosts::load_from(&self.known_hosts_path)
            .map_err(|e| russh::Error::from(std::io::Error::other(e.to_string())))?;

        match known_hosts.verify(&self.host, self.port, server_public_key) {
            VerifyResult::Trusted => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            VerifyResult::Unknown if self.accept_unknown_hosts => {
                warn!(
                    "Accepting unknown host key for {}:{} ({})",
                    self.host,
                    self.port,
                    calculate_fingerprint(server_public_key)
                );
                known_hosts.add(&self.host, self.port, server_public_key);
                known_hosts
                    .save()
                    .map_err(|e| russh::Error::from(std::io::Error::other(e.to_string())))?;
                Ok(true)
            }
            VerifyResult::Unknown => {
                error!(
                    "Host key for {}:{} ({}) is not in {}",
                    self.host,
                    self.port,
                    calculate_fingerprint(server_public_key),
                    known_hosts.path().display()
                );
                Ok(false)
            }
            VerifyResult::Mismatch { line_number } => {
                error!(
                    "HOST KEY MISMATCH for {}:{}: got {}, expected key at line {} of {}",
                    self.host,
                    self.port,
                    calculate_fingerprint(server_public_key),
                    line_number,
                    known_hosts.path().display()
                );
                Ok(false)
            }
        }
    }
}

/// Connects to the configured jump host
pub struct SshConnector {
    jump_host: JumpHostConfig,
    options: TunnelOptions,
    password: Option<Zeroizing<String>>,
    passphrase: Option<Zeroizing<String>>,
}

impl SshConnector {
    pub fn new(jump_host: JumpHostConfig, options: TunnelOptions) -> Self {
        Self {
            jump_host,
            options,
            password: None,
            passphrase: None,
        }
    }

    /// Password for `auth_type = "password"`
    pub fn with_password(mut self, password: Zeroizing<String>) -> Self {
        self.password = Some(password);
        self
    }

    /// Passphrase for an encrypted private key
    pub fn with_passphrase(mut self, passphrase: Zeroizing<String>) -> Self {
        self.passphrase = Some(passphrase);
        self
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self) -> Result<Arc<dyn ForwardingSession>> {
        Ok(Arc::new(SshSession::connect(self).await?))
    }

    fn describe(&self) -> String {
        format!(
            "{}@{}",
            self.jump_host.user,
            format_host_port(&self.jump_host.host, self.jump_host.port)
        )
    }
}

/// An authenticated SSH session to the jump host
pub struct SshSession {
    handle: Handle<ClientHandler>,
    addr: String,
}

impl SshSession {
    async fn connect(connector: &SshConnector) -> Result<Self> {
        let jump_host = &connector.jump_host;
        let options = &connector.options;

        let mut cfg = Config::default();
        cfg.window_size = options.window_size;
        cfg.maximum_packet_size = options.max_packet_size;
        cfg.nodelay = true;
        cfg.keepalive_interval = options.keepalive_interval();
        cfg.keepalive_max = 3;
        let config = Arc::new(cfg);

        let handler = ClientHandler {
            host: jump_host.host.clone(),
            port: jump_host.port,
            known_hosts_path: options.known_hosts_path.clone(),
            accept_unknown_hosts: options.accept_unknown_hosts,
        };

        let addr = format_host_port(&jump_host.host, jump_host.port);
        info!("Connecting to SSH server: {}", addr);

        let timeout = options.connect_timeout();
        let mut handle =
            match tokio::time::timeout(timeout, client::connect(config, addr.as_str(), handler))
                .await
            {
                Ok(Ok(handle)) => handle,
                Ok(Err(russh::Error::UnknownKey)) => {
                    return Err(Error::HostKey(format!(
                        "{} presented a host key that is not trusted",
                        addr
                    )))
                }
                Ok(Err(e)) => {
                    return Err(Error::SshConnection(format!(
                        "Failed to connect to {}: {}",
                        addr, e
                    )))
                }
                Err(_) => {
                    return Err(Error::SshConnection(format!(
                        "Connection to {} timed out after {:?}",
                        addr, timeout
                    )))
                }
            };

        let authenticated = match jump_host.auth_type {
            AuthType::Key => {
                let key_path = jump_host.key_path.as_deref().ok_or_else(|| {
                    Error::Config("Key path required for key authentication".to_string())
                })?;
                info!("Authenticating with key: {}", key_path.display());
                authenticate_with_key(
                    &mut handle,
                    &jump_host.user,
                    key_path,
                    connector.passphrase.as_ref(),
                )
                .await?
            }
            AuthType::Password => {
                let password = connector.password.as_ref().ok_or_else(|| {
                    Error::Authentication("No password supplied".to_string())
                })?;
                info!("Authenticating with password");
                authenticate_with_password(&mut handle, &jump_host.user, password).await?
            }
        };

        if !authenticated {
            return Err(Error::Authentication(format!(
                "{} rejected {}",
                addr, jump_host.user
            )));
        }

        info!("SSH authentication successful");
        Ok(Self { handle, addr })
    }
}

#[async_trait]
impl ForwardingSession for SshSession {
    async fn open_forward_channel(
        &self,
        remote: &RemoteEndpoint,
        originator: SocketAddr,
    ) -> Result<Box<dyn ForwardStream>> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                remote.host(),
                remote.port().into(),
                originator.ip().to_string(),
                originator.port().into(),
            )
            .await
            .map_err(|e| {
                Error::SshConnection(format!("Failed to open channel to {}: {}", remote, e))
            })?;

        Ok(Box::new(channel.into_stream()))
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.addr);
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| Error::SshConnection(format!("Failed to disconnect: {}", e)))
    }
}

async fn authenticate_with_key(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    key_path: &Path,
    passphrase: Option<&Zeroizing<String>>,
) -> Result<bool> {
    let key = load_secret_key(key_path, passphrase.map(|p| p.as_str())).map_err(|e| {
        Error::Authentication(format!(
            "Failed to load SSH key from {}: {}",
            key_path.display(),
            e
        ))
    })?;

    // Non-RSA keys ignore the hash algorithm
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(|e| Error::SshConnection(e.to_string()))?
        .flatten();
    let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);

    let result = handle
        .authenticate_publickey(user, key_with_alg)
        .await
        .map_err(|e| Error::Authentication(format!("Public key authentication failed: {}", e)))?;

    Ok(matches!(result, AuthResult::Success))
}

async fn authenticate_with_password(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    password: &Zeroizing<String>,
) -> Result<bool> {
    let result = handle
        .authenticate_password(user, password.as_str())
        .await
        .map_err(|e| Error::Authentication(format!("Password authentication failed: {}", e)))?;

    Ok(matches!(result, AuthResult::Success))
}
