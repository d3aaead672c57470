// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Core Library
// Address-resolving local port forwards through an SSH jump host

pub mod connection;
pub mod forwarder;
pub mod known_hosts;
pub mod ports;
pub mod session;
pub mod ssh;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tunnel;

pub use connection::{AddressResolver, CmdLine, Connection, RemoteFile, RemoteProcess};
pub use forwarder::PortForwarder;
pub use ports::find_free_port;
pub use session::{ForwardStream, ForwardingSession, SessionConnector};
pub use ssh::{SshConnector, SshSession};
pub use tunnel::{TunnelConnection, PROTOCOL};

// Re-export shared types so callers need only this crate
pub use jump_tunnel_common::{
    Error, JumpHostConfig, LocalBinding, Operation, RemoteEndpoint, Result, TunnelConfig,
    TunnelOptions, TunnelPhase,
};
