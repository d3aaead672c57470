// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Common Library
// Shared types, errors, configuration and socket helpers

pub mod config;
pub mod error;
pub mod network;
pub mod types;

pub use config::{AuthType, JumpHostConfig, TunnelConfig, TunnelOptions};
pub use error::{Error, Result};
pub use network::{bind_listener, format_host_port, is_port_available, LOCALHOST};
pub use types::{LocalBinding, Operation, RemoteEndpoint, TunnelPhase};
