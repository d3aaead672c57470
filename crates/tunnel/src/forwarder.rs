// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Port Forwarder
// One background task per forward: owns the local listener and relays every
// accepted connection over the SSH session to a fixed remote endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use jump_tunnel_common::{bind_listener, Error, LocalBinding, RemoteEndpoint, Result};

use crate::session::ForwardingSession;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// One-shot readiness gate: fired once the listener is bound (or failed to)
type ReadySender = oneshot::Sender<std::io::Result<()>>;

/// A running local port forward
pub struct PortForwarder {
    binding: LocalBinding,
    remote: RemoteEndpoint,
    /// Signals the background task to drop its listener and relays
    shutdown: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PortForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForwarder")
            .field("binding", &self.binding)
            .field("remote", &self.remote)
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}

impl PortForwarder {
    /// Spawn the forwarder task and wait until its listener is bound
    ///
    /// Returns only once `binding` is accepting connections. A bind failure
    /// (or the task dying before it could report) is returned as
    /// [`Error::ForwardSetup`].
    pub async fn start(
        session: Arc<dyn ForwardingSession>,
        remote: RemoteEndpoint,
        binding: LocalBinding,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        info!(
            "Starting SSH local port forward [{}:{}]",
            binding.port(),
            remote
        );
        let handle = tokio::spawn(run_forwarder(
            session,
            remote.clone(),
            binding,
            ready_tx,
            shutdown.clone(),
        ));

        // Cancels the task if this future is dropped while waiting
        let guard = shutdown.clone().drop_guard();
        let setup_error = match ready_rx.await {
            Ok(Ok(())) => {
                guard.disarm();
                return Ok(Self {
                    binding,
                    remote,
                    shutdown,
                    join_handle: Some(handle),
                });
            }
            Ok(Err(e)) => e,
            Err(_) => std::io::Error::other("forwarder task exited before its listener was ready"),
        };

        if let Err(e) = handle.await {
            debug!("Forwarder task for {} ended abnormally: {}", remote, e);
        }

        Err(Error::ForwardSetup {
            local_port: binding.port(),
            remote,
            source: setup_error,
        })
    }

    pub fn binding(&self) -> LocalBinding {
        self.binding
    }

    pub fn remote(&self) -> &RemoteEndpoint {
        &self.remote
    }

    /// Close the listening socket and wait for the background task to exit
    pub async fn close(mut self) -> Result<()> {
        self.shutdown.cancel();

        if let Some(handle) = self.join_handle.take() {
            handle.await.map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "forwarder task for {} failed: {}",
                    self.remote, e
                )))
            })?;
        }

        debug!(
            "Closed SSH local port forward [{}:{}]",
            self.binding.port(),
            self.remote
        );
        Ok(())
    }
}

impl Drop for PortForwarder {
    fn drop(&mut self) {
        // Never leave an orphaned listener behind, even without close()
        self.shutdown.cancel();
    }
}

async fn run_forwarder(
    session: Arc<dyn ForwardingSession>,
    remote: RemoteEndpoint,
    binding: LocalBinding,
    ready_tx: ReadySender,
    shutdown: CancellationToken,
) {
    let listener = match bind_listener(binding.port()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Couldn't set up local port forward [{}:{}]: {}",
                binding.port(),
                remote,
                e
            );
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(())).is_err() {
        debug!(
            "Requester for {} stopped waiting, releasing {}",
            remote, binding
        );
        return;
    }

    info!("Listening on {} for {}", binding.socket_addr(), remote);

    let mut relays = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("Accepted connection from {} for {}", peer_addr, remote);
                    relays.spawn(relay_connection(
                        session.clone(),
                        remote.clone(),
                        stream,
                        peer_addr,
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept connection on {}: {}", binding, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },

            Some(finished) = relays.join_next(), if !relays.is_empty() => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        warn!("Relay task for {} panicked: {}", remote, e);
                    }
                }
            }
        }
    }

    drop(listener);
    relays.shutdown().await;
    debug!("Forwarder for {} on {} stopped", remote, binding);
}

/// Relay a single accepted connection until either side closes
async fn relay_connection(
    session: Arc<dyn ForwardingSession>,
    remote: RemoteEndpoint,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let mut channel = match session.open_forward_channel(&remote, peer_addr).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Failed to open forwarding channel to {}: {}", remote, e);
            return;
        }
    };

    match copy_bidirectional(&mut stream, &mut channel).await {
        Ok((from_tcp, from_ssh)) => debug!(
            "Forward connection closed: {} bytes from TCP, {} bytes from SSH",
            from_tcp, from_ssh
        ),
        Err(e) => debug!("Forward connection to {} ended: {}", remote, e),
    }
}
