// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Tunnel Connection
// Resolves jump-host-only endpoints to local forwards over one SSH session

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jump_tunnel_common::{Error, LocalBinding, RemoteEndpoint, Result, TunnelPhase};

use crate::connection::{AddressResolver, Connection};
use crate::forwarder::PortForwarder;
use crate::ports::find_free_port;
use crate::session::{ForwardingSession, SessionConnector};

pub const PROTOCOL: &str = "ssh-tunnel";

/// A connection to a jump host whose only capability is address resolution
pub struct TunnelConnection {
    id: Uuid,
    connector: Box<dyn SessionConnector>,
    port_range_start: u16,
    /// Registry, forwarders and session, guarded together
    state: Mutex<TunnelState>,
}

struct TunnelState {
    phase: TunnelPhase,
    session: Option<Arc<dyn ForwardingSession>>,
    /// Remote endpoint -> local port, at most one per endpoint
    forwards: HashMap<RemoteEndpoint, LocalBinding>,
    /// Live forwarders, closed in bulk on teardown
    forwarders: Vec<PortForwarder>,
}

impl TunnelState {
    fn connected_session(&self) -> Result<Arc<dyn ForwardingSession>> {
        match (self.phase, &self.session) {
            (TunnelPhase::Connected, Some(session)) => Ok(session.clone()),
            (TunnelPhase::Closed, _) => Err(Error::Closed),
            _ => Err(Error::IllegalState(
                "Tunnel connection has no SSH session; call connect() first".to_string(),
            )),
        }
    }
}

// Manual Debug impl since the session and connector are trait objects
impl std::fmt::Debug for TunnelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConnection")
            .field("id", &self.id)
            .field("target", &self.connector.describe())
            .field("port_range_start", &self.port_range_start)
            .finish()
    }
}

impl TunnelConnection {
    pub fn new(connector: impl SessionConnector + 'static, port_range_start: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            connector: Box::new(connector),
            port_range_start,
            state: Mutex::new(TunnelState {
                phase: TunnelPhase::NotConnected,
                session: None,
                forwards: HashMap::new(),
                forwarders: Vec::new(),
            }),
        }
    }

    /// Create and connect in one step
    pub async fn open(
        connector: impl SessionConnector + 'static,
        port_range_start: u16,
    ) -> Result<Self> {
        let tunnel = Self::new(connector, port_range_start);
        tunnel.connect().await?;
        Ok(tunnel)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn phase(&self) -> TunnelPhase {
        self.state.lock().await.phase
    }

    /// Establish the SSH session through the connector
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.phase {
            TunnelPhase::NotConnected => {}
            TunnelPhase::Connected => {
                return Err(Error::IllegalState(
                    "Tunnel connection is already connected".to_string(),
                ))
            }
            TunnelPhase::Closed => return Err(Error::Closed),
        }

        info!(
            "Connecting tunnel {} via {}",
            self.id,
            self.connector.describe()
        );
        let session = self.connector.connect().await?;

        state.session = Some(session);
        state.phase = TunnelPhase::Connected;
        info!("Tunnel {} connected", self.id);
        Ok(())
    }

    /// Return the local binding forwarding to `remote`, starting one if needed
    ///
    /// The lock is held across port allocation and forwarder start-up so two
    /// callers racing on the same new endpoint cannot both start a forward.
    /// A forwarder that fails to start closes the whole connection.
    pub async fn resolve(&self, remote: &RemoteEndpoint) -> Result<LocalBinding> {
        let mut state = self.state.lock().await;
        let session = state.connected_session()?;

        if let Some(binding) = state.forwards.get(remote) {
            debug!("Reusing {} for {}", binding, remote);
            return Ok(*binding);
        }

        // Up to ~64k synchronous bind probes; keep them off the runtime workers
        let start = self.port_range_start;
        let port = tokio::task::spawn_blocking(move || find_free_port(start))
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "port scan from {} failed: {}",
                    start, e
                )))
            })??;
        self.start_forward(&mut state, session, remote, LocalBinding::new(port))
            .await
    }

    async fn start_forward(
        &self,
        state: &mut TunnelState,
        session: Arc<dyn ForwardingSession>,
        remote: &RemoteEndpoint,
        binding: LocalBinding,
    ) -> Result<LocalBinding> {
        match PortForwarder::start(session, remote.clone(), binding).await {
            Ok(forwarder) => {
                state.forwards.insert(remote.clone(), binding);
                state.forwarders.push(forwarder);
                info!("Resolved {} to {}", remote, binding);
                Ok(binding)
            }
            Err(e) => {
                error!(
                    "Forward setup for {} failed, closing tunnel {}: {}",
                    remote, self.id, e
                );
                self.shutdown(state).await;
                Err(e)
            }
        }
    }

    /// Snapshot of the registry, ordered by local port
    pub async fn forwards(&self) -> Vec<(RemoteEndpoint, LocalBinding)> {
        let state = self.state.lock().await;
        let mut forwards: Vec<_> = state
            .forwards
            .iter()
            .map(|(remote, binding)| (remote.clone(), *binding))
            .collect();
        forwards.sort_by_key(|(_, binding)| binding.port());
        forwards
    }

    /// Stop every forwarder, then disconnect the session
    ///
    /// Returns once all forwarder tasks have exited. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.shutdown(&mut state).await;
    }

    async fn shutdown(&self, state: &mut TunnelState) {
        if state.phase == TunnelPhase::Closed {
            return;
        }

        debug!("Closing tunnel {}", self.id);
        state.phase = TunnelPhase::Closed;

        for forwarder in state.forwarders.drain(..) {
            let binding = forwarder.binding();
            if let Err(e) = forwarder.close().await {
                warn!("Failed to close forward on {}: {}", binding, e);
            }
        }
        state.forwards.clear();

        if let Some(session) = state.session.take() {
            if let Err(e) = session.disconnect().await {
                debug!("Failed to disconnect gracefully: {}", e);
            }
        }

        info!("Tunnel {} closed", self.id);
    }
}

#[async_trait]
impl AddressResolver for TunnelConnection {
    async fn resolve(&self, remote: &RemoteEndpoint) -> Result<LocalBinding> {
        TunnelConnection::resolve(self, remote).await
    }
}

#[async_trait]
impl Connection for TunnelConnection {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn close(&self) {
        TunnelConnection::close(self).await
    }

    fn address_resolver(&self) -> Option<&dyn AddressResolver> {
        Some(self)
    }
}
