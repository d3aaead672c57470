// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Common types for Jump Tunnel

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::network::{format_host_port, LOCALHOST};

/// A destination only reachable through the jump host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteEndpoint {
    host: String,
    port: u16,
}

impl RemoteEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_host_port(&self.host, self.port))
    }
}

impl FromStr for RemoteEndpoint {
    type Err = Error;

    /// Accepts `host:port` and `[v6addr]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEndpoint(s.to_string());

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
            host.parse::<IpAddr>().map_err(|_| invalid())?;
            (host, port)
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
            // Bare IPv6 literals are ambiguous without brackets
            if host.contains(':') {
                return Err(invalid());
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for RemoteEndpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteEndpoint> for String {
    fn from(endpoint: RemoteEndpoint) -> Self {
        endpoint.to_string()
    }
}

/// A local port standing in for a [`RemoteEndpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalBinding {
    port: u16,
}

impl LocalBinding {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The address handed out to callers, always `localhost:<port>`
    pub fn address(&self) -> String {
        format!("localhost:{}", self.port)
    }

    /// The socket address the forwarder listens on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(LOCALHOST), self.port)
    }
}

impl fmt::Display for LocalBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

/// Remote file and process operations a connection may refuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetFile,
    GetChildFile,
    StartProcess,
    Execute,
    GetWorkingDirectory,
    SetWorkingDirectory,
    ProcessCommandLine,
    AddCommandSeparator,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operation::GetFile => "get a file",
            Operation::GetChildFile => "get a child file",
            Operation::StartProcess => "start a process",
            Operation::Execute => "execute a command",
            Operation::GetWorkingDirectory => "get the working directory",
            Operation::SetWorkingDirectory => "set the working directory",
            Operation::ProcessCommandLine => "process a command line",
            Operation::AddCommandSeparator => "add a command separator",
        };
        f.write_str(text)
    }
}

/// Lifecycle phase of a tunnel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelPhase {
    NotConnected, // connect() not called yet
    Connected,    // session established, forwards may be resolved
    Closed,       // torn down, terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_endpoint() {
        let endpoint: RemoteEndpoint = "10.0.0.5:443".parse().unwrap();
        assert_eq!(endpoint.host(), "10.0.0.5");
        assert_eq!(endpoint.port(), 443);

        let endpoint: RemoteEndpoint = "db.internal:5432".parse().unwrap();
        assert_eq!(endpoint, RemoteEndpoint::new("db.internal", 5432));

        let endpoint: RemoteEndpoint = "[fd00::5]:8080".parse().unwrap();
        assert_eq!(endpoint.host(), "fd00::5");
        assert_eq!(endpoint.to_string(), "[fd00::5]:8080");
    }

    #[test]
    fn test_parse_remote_endpoint_rejects_garbage() {
        for input in [
            "",
            "host",
            ":443",
            "host:",
            "host:0",
            "host:70000",
            "fd00::5:80",
            "[nope]:80",
        ] {
            assert!(
                input.parse::<RemoteEndpoint>().is_err(),
                "expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_remote_endpoint_serde_as_string() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            forwards: Vec<RemoteEndpoint>,
        }

        let parsed: Wrapper =
            toml::from_str(r#"forwards = ["10.0.0.5:443", "10.0.0.6:443"]"#).unwrap();
        assert_eq!(parsed.forwards[1], RemoteEndpoint::new("10.0.0.6", 443));

        let bad: std::result::Result<Wrapper, _> = toml::from_str(r#"forwards = ["10.0.0.5"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_local_binding_address() {
        let binding = LocalBinding::new(20000);
        assert_eq!(binding.address(), "localhost:20000");
        assert_eq!(binding.to_string(), "localhost:20000");
        assert_eq!(binding.socket_addr(), "127.0.0.1:20000".parse().unwrap());
    }
}
