//! Payload decoding and dispatch.

use tracing::trace;

use crate::node::{Node, NodeError};
use crate::protocol::{Message, ProtocolError};

impl Node {
    /// Decode, verify, and dispatch one raw inbound payload.
    ///
    /// `interface` names the local interface the payload arrived on; it
    /// selects the control address used in any reply. Safe to invoke
    /// concurrently: every read-modify-write on a neighbor goes through
    /// the table lock as one unit.
    pub async fn handle_payload(&self, payload: &[u8], interface: &str) -> Result<(), NodeError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| ProtocolError::MalformedMessage("payload is not UTF-8".into()))?;

        trace!(interface = %interface, payload = %text, "received");

        match Message::decode(text)? {
            Message::Hello(msg) => self.handle_hello(msg, interface).await,
            Message::Tunnel(msg) => self.handle_tunnel(msg).await,
        }
    }
}
