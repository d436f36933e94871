//! Hello handshake handler.

use tracing::{debug, info};

use crate::neighbor::NeighborState;
use crate::node::{Node, NodeError};
use crate::protocol::{HelloMessage, ProtocolError};

impl Node {
    /// Handle a verified Hello.
    ///
    /// Replay check, control-address refresh, and state advancement happen
    /// as one atomic table update. An unsolicited Hello (confirm unset)
    /// must be answered with a confirming Hello sent to the peer's control
    /// address; a confirmation completes the round and advances the
    /// neighbor to mutual.
    pub(super) async fn handle_hello(
        &self,
        msg: HelloMessage,
        interface: &str,
    ) -> Result<(), NodeError> {
        let source = msg.metadata.source_public_key;
        let seqnum = msg.metadata.seqnum;
        let confirm = msg.metadata.confirm;

        self.neighbors.update(source, |n| {
            if !n.try_advance(seqnum) {
                return Err(ProtocolError::ReplaySequenceNumber {
                    got: seqnum,
                    last: n.last_accepted_seqnum.unwrap_or(0),
                });
            }
            n.control_address = msg.control_address.clone();
            n.advance_state(if confirm {
                NeighborState::Mutual
            } else {
                NeighborState::Greeted
            });
            Ok(())
        })?;

        if confirm {
            info!(peer = %source.short(), seq = seqnum, "hello confirmed, neighbor mutual");
            return Ok(());
        }

        debug!(
            peer = %source.short(),
            seq = seqnum,
            control_address = %msg.control_address,
            "hello accepted, confirming"
        );

        // Errors sending the confirmation surface to the caller; the
        // accepted state above is deliberately kept.
        let wire = self.build_hello(interface, true)?;
        self.transport
            .send_unicast(&msg.control_address, wire.as_bytes())
            .await?;

        Ok(())
    }
}
