// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Error types for Jump Tunnel

use thiserror::Error;

use crate::types::{Operation, RemoteEndpoint};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    #[error("Could not find a single free port in the range {start}-65535")]
    PortsExhausted { start: u16 },

    #[error("Couldn't set up local port forward [{local_port}:{remote}]: {source}")]
    ForwardSetup {
        local_port: u16,
        remote: RemoteEndpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot {0} on a tunnel connection")]
    Unsupported(Operation),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Tunnel connection is closed")]
    Closed,

    #[error("SSH connection error: {0}")]
    SshConnection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Host key verification failed: {0}")]
    HostKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error was caused by a failing socket operation
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ForwardSetup { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_setup_is_io() {
        let err = Error::ForwardSetup {
            local_port: 20000,
            remote: RemoteEndpoint::new("10.0.0.5", 443),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.is_io());
        assert!(err.to_string().contains("[20000:10.0.0.5:443]"));
        assert!(!Error::Closed.is_io());
    }

    #[test]
    fn test_unsupported_names_operation() {
        let err = Error::Unsupported(Operation::GetFile);
        assert_eq!(err.to_string(), "Cannot get a file on a tunnel connection");
    }
}
