// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Session Seams
// The SSH capabilities a tunnel connection depends on

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use jump_tunnel_common::{RemoteEndpoint, Result};

/// Bidirectional byte stream carried by a forwarding channel
pub trait ForwardStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ForwardStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// An established SSH session able to open local port forward channels
///
/// Implementations must allow concurrent channel creation: every forwarder
/// of a tunnel opens channels through the same shared session.
#[async_trait]
pub trait ForwardingSession: Send + Sync + 'static {
    /// Open a direct-tcpip channel to `remote` on behalf of `originator`
    async fn open_forward_channel(
        &self,
        remote: &RemoteEndpoint,
        originator: SocketAddr,
    ) -> Result<Box<dyn ForwardStream>>;

    /// Tear the session down
    async fn disconnect(&self) -> Result<()>;
}

/// Establishes the SSH session a tunnel connection runs on
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ForwardingSession>>;

    /// Human-readable target used in logs
    fn describe(&self) -> String;
}
