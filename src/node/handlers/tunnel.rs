//! Tunnel negotiation handler.

use tracing::{debug, info};

use crate::neighbor::NeighborState;
use crate::node::{Node, NodeError};
use crate::protocol::{ProtocolError, TunnelMessage};
use crate::tunnel::ProvisionRequest;

/// What the table update decided should happen next.
enum TunnelAction {
    /// Unsolicited proposal accepted: confirm to the peer's control address.
    Confirm(String),
    /// Negotiation complete: provision with the peer's advertised identity.
    Provision {
        peer_public_key: String,
        peer_endpoint: String,
    },
    /// Confirmation arrived in a state with no proposal in flight.
    Ignore(NeighborState),
}

impl Node {
    /// Handle a verified Tunnel message.
    ///
    /// Shares the per-peer sequence space with Hello: the same counter
    /// guards both families. The outcome is decided under the table lock;
    /// sending and provisioning happen after it is released.
    pub(super) async fn handle_tunnel(&self, msg: TunnelMessage) -> Result<(), NodeError> {
        let source = msg.metadata.source_public_key;
        let seqnum = msg.metadata.seqnum;
        let confirm = msg.metadata.confirm;

        let action = self.neighbors.update(source, |n| {
            if !n.try_advance(seqnum) {
                return Err(ProtocolError::ReplaySequenceNumber {
                    got: seqnum,
                    last: n.last_accepted_seqnum.unwrap_or(0),
                });
            }

            if !confirm {
                n.tunnel.peer_public_key = msg.tunnel_public_key.clone();
                n.tunnel.peer_endpoint = msg.tunnel_endpoint.clone();
                n.advance_state(NeighborState::TunnelProposed);
                return Ok(TunnelAction::Confirm(n.control_address.clone()));
            }

            if n.state == NeighborState::TunnelProposed {
                n.tunnel.peer_public_key = msg.tunnel_public_key.clone();
                n.tunnel.peer_endpoint = msg.tunnel_endpoint.clone();
                n.advance_state(NeighborState::TunnelConfirmed);
                Ok(TunnelAction::Provision {
                    peer_public_key: msg.tunnel_public_key.clone(),
                    peer_endpoint: msg.tunnel_endpoint.clone(),
                })
            } else {
                Ok(TunnelAction::Ignore(n.state))
            }
        })?;

        match action {
            TunnelAction::Confirm(dest) => {
                if dest.is_empty() {
                    return Err(ProtocolError::InvalidMessage(
                        "no control address known for proposing peer".into(),
                    )
                    .into());
                }

                debug!(peer = %source.short(), seq = seqnum, "tunnel proposed, confirming");

                let wire = self.build_tunnel(true)?;
                self.transport.send_unicast(&dest, wire.as_bytes()).await?;
                Ok(())
            }
            TunnelAction::Provision {
                peer_public_key,
                peer_endpoint,
            } => {
                self.provision_tunnel(source, peer_public_key, peer_endpoint)
                    .await
            }
            TunnelAction::Ignore(state) => {
                debug!(
                    peer = %source.short(),
                    state = %state,
                    "tunnel confirmation without proposal in flight, ignoring"
                );
                Ok(())
            }
        }
    }

    /// Invoke the provisioner for a confirmed negotiation.
    ///
    /// Runs outside the table lock. On failure the neighbor stays in
    /// `TunnelConfirmed`; the handshake must be retried by peer action.
    async fn provision_tunnel(
        &self,
        peer: crate::identity::NodeKey,
        peer_public_key: String,
        peer_endpoint: String,
    ) -> Result<(), NodeError> {
        let Some(private_key) = self.config.tunnel.private_key.clone() else {
            return Err(NodeError::TunnelNotConfigured);
        };

        let request = ProvisionRequest {
            interface_name: self.config.tunnel.interface_name().to_string(),
            listen_port: self.config.tunnel.listen_port(),
            private_key,
            peer_public_key,
            peer_endpoint,
        };

        self.provisioner.provision(&request).await?;

        self.neighbors.update(peer, |n| {
            n.tunnel.listen_port = Some(request.listen_port);
            n.tunnel.interface_name = Some(request.interface_name.clone());
            n.advance_state(NeighborState::TunnelActive);
        });

        info!(
            peer = %peer.short(),
            interface = %request.interface_name,
            endpoint = %request.peer_endpoint,
            "tunnel active"
        );
        Ok(())
    }
}
