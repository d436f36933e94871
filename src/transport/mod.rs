//! Transport layer
//!
//! The protocol engine is transport-agnostic: it consumes raw payloads from
//! an ingestion channel and sends replies through the [`Transport`] trait.
//! The concrete driver is multicast/unicast UDP (see [`udp`]); listener
//! tasks push `(payload, interface)` pairs onto a single channel consumed
//! by the node's event loop.

pub mod udp;

use async_trait::async_trait;
use thiserror::Error;

/// A raw payload received from a transport listener.
#[derive(Clone, Debug)]
pub struct ReceivedPayload {
    /// Payload bytes as they arrived on the wire.
    pub data: Vec<u8>,
    /// Name of the local interface the payload arrived on.
    pub interface: String,
}

/// Channel sender for received payloads.
pub type PayloadTx = tokio::sync::mpsc::Sender<ReceivedPayload>;

/// Channel receiver for received payloads.
pub type PayloadRx = tokio::sync::mpsc::Receiver<ReceivedPayload>;

/// Create a payload channel with the given buffer size.
pub fn payload_channel(buffer: usize) -> (PayloadTx, PayloadRx) {
    tokio::sync::mpsc::channel(buffer)
}

/// Errors related to transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("invalid destination address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound side of a transport driver.
///
/// Listen loops are driver-specific (they are spawned tasks, not trait
/// methods); the engine only needs to address a peer or an interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a payload to a unicast destination ("host:port").
    async fn send_unicast(&self, dest: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Send a payload to the control multicast group on `interface`.
    async fn send_multicast(
        &self,
        interface: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}
