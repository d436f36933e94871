//! Protocol engine
//!
//! The [`Node`] consumes raw inbound payloads, dispatches by message type,
//! applies signature and replay checks, advances neighbor state, and emits
//! the next outbound message when the handshake calls for a reply. It owns
//! the neighbor table and the collaborator handles (transport, tunnel
//! provisioner).
//!
//! Handlers take `&self` and serialize all shared-state access through the
//! neighbor table lock, so dispatch is safe to invoke concurrently; in the
//! running daemon, listener tasks push payloads onto one ingestion channel
//! and [`Node::run`] is the single consumer.

mod handlers;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::identity::{Identity, NodeKey};
use crate::neighbor::{NeighborState, NeighborTable};
use crate::protocol::{HelloMessage, MessageMetadata, ProtocolError, TunnelMessage};
use crate::transport::{PayloadRx, Transport, TransportError};
use crate::tunnel::{TunnelError, TunnelProvisioner};

/// How often parked tunnel negotiations are swept.
const NEGOTIATION_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Errors surfaced by engine operations.
///
/// Per-message errors are non-fatal: the event loop logs them and keeps
/// consuming.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("unknown neighbor: {0}")]
    UnknownNeighbor(NodeKey),

    #[error("no control address known for neighbor {0}")]
    NoControlAddress(NodeKey),

    #[error("no local tunnel identity configured")]
    TunnelNotConfigured,
}

/// A running protocol engine instance.
pub struct Node {
    identity: Arc<Identity>,
    neighbors: NeighborTable,
    transport: Arc<dyn Transport>,
    provisioner: Arc<dyn TunnelProvisioner>,
    config: Config,
}

impl Node {
    /// Create an engine around its collaborators.
    pub fn new(
        identity: Identity,
        transport: Arc<dyn Transport>,
        provisioner: Arc<dyn TunnelProvisioner>,
        config: Config,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            neighbors: NeighborTable::new(),
            transport,
            provisioner,
            config,
        }
    }

    /// This node's identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The neighbor table.
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Announce this node on `interface` via multicast discovery.
    pub async fn send_hello(&self, interface: &str) -> Result<(), NodeError> {
        let wire = self.build_hello(interface, false)?;
        let port = self.config.node.control.multicast_port();
        self.transport
            .send_multicast(interface, port, wire.as_bytes())
            .await?;

        debug!(interface = %interface, seq = self.identity.current_seqnum(), "sent multicast hello");
        Ok(())
    }

    /// Re-announce this node to a known peer address via unicast.
    pub async fn send_hello_to(&self, dest: &str, interface: &str) -> Result<(), NodeError> {
        let wire = self.build_hello(interface, false)?;
        self.transport.send_unicast(dest, wire.as_bytes()).await?;

        debug!(dest = %dest, seq = self.identity.current_seqnum(), "sent unicast hello");
        Ok(())
    }

    /// Propose a tunnel to a known, greeted neighbor.
    ///
    /// Sends the local tunnel identity and marks the negotiation as in
    /// flight; the tunnel is provisioned once the peer's confirmation
    /// arrives.
    pub async fn propose_tunnel(&self, peer: &NodeKey) -> Result<(), NodeError> {
        let neighbor = self
            .neighbors
            .lookup(peer)
            .ok_or(NodeError::UnknownNeighbor(*peer))?;
        if neighbor.control_address.is_empty() {
            return Err(NodeError::NoControlAddress(*peer));
        }

        let wire = self.build_tunnel(false)?;
        self.neighbors
            .update(*peer, |n| n.advance_state(NeighborState::TunnelProposed));
        self.transport
            .send_unicast(&neighbor.control_address, wire.as_bytes())
            .await?;

        info!(peer = %peer.short(), dest = %neighbor.control_address, "proposed tunnel");
        Ok(())
    }

    /// Run the receive event loop.
    ///
    /// Consumes the ingestion channel until it closes. Per-message errors
    /// are logged and dropped; one bad, malicious, or duplicate message
    /// never aborts the loop or corrupts state for other peers. A periodic
    /// tick rolls stale tunnel negotiations back so they can be retried.
    pub async fn run(&self, mut payload_rx: PayloadRx) {
        let timeout = Duration::from_secs(self.config.node.negotiation_timeout_secs());
        let mut tick = tokio::time::interval(NEGOTIATION_SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("engine event loop started");

        loop {
            tokio::select! {
                payload = payload_rx.recv() => {
                    let Some(payload) = payload else {
                        break; // channel closed
                    };
                    if let Err(e) = self.handle_payload(&payload.data, &payload.interface).await {
                        warn!(interface = %payload.interface, error = %e, "dropping message");
                    }
                }
                _ = tick.tick() => {
                    let decayed = self.neighbors.decay_stale_negotiations(timeout);
                    if decayed > 0 {
                        debug!(count = decayed, "stale tunnel negotiations rolled back");
                    }
                }
            }
        }

        info!("engine event loop stopped (channel closed)");
    }

    /// Drain any payloads already queued, without waiting.
    ///
    /// Test and shutdown helper; the daemon path uses [`run`](Self::run).
    pub async fn drain(&self, payload_rx: &mut PayloadRx) -> usize {
        let mut handled = 0;
        loop {
            match payload_rx.try_recv() {
                Ok(payload) => {
                    if let Err(e) = self.handle_payload(&payload.data, &payload.interface).await {
                        warn!(interface = %payload.interface, error = %e, "dropping message");
                    }
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Build a signed Hello for `interface`, claiming the next sequence
    /// number.
    fn build_hello(&self, interface: &str, confirm: bool) -> Result<String, NodeError> {
        let control_address = self
            .identity
            .control_address(interface)
            .unwrap_or_default()
            .to_string();
        let msg = HelloMessage {
            metadata: MessageMetadata::new(
                self.identity.public_key(),
                self.identity.next_seqnum(),
                confirm,
            ),
            control_address,
        };
        Ok(msg.encode(&self.identity)?)
    }

    /// Build a signed Tunnel message carrying the local tunnel identity.
    fn build_tunnel(&self, confirm: bool) -> Result<String, NodeError> {
        let (Some(public_key), Some(endpoint)) = (
            self.config.tunnel.public_key.as_ref(),
            self.config.tunnel.endpoint.as_ref(),
        ) else {
            return Err(NodeError::TunnelNotConfigured);
        };

        let msg = TunnelMessage {
            metadata: MessageMetadata::new(
                self.identity.public_key(),
                self.identity.next_seqnum(),
                confirm,
            ),
            tunnel_public_key: public_key.clone(),
            tunnel_endpoint: endpoint.clone(),
        };
        Ok(msg.encode(&self.identity)?)
    }
}
