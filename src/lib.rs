//! WEFT: mesh overlay node agent
//!
//! Nodes discover each other over a local network, authenticate each
//! other's identity with Ed25519 signatures, and negotiate encrypted
//! WireGuard tunnels between themselves. The crate is organized around the
//! protocol engine ([`Node`]): the [`protocol`] module defines the signed
//! wire format, [`neighbor`] tracks per-peer replay and handshake state,
//! [`transport`] carries payloads over multicast/unicast UDP, and
//! [`tunnel`] provisions the negotiated interfaces.

pub mod config;
pub mod identity;
pub mod neighbor;
pub mod node;
pub mod protocol;
pub mod transport;
pub mod tunnel;

// Re-export configuration types
pub use config::{Config, ConfigError, ControlConfig, NodeConfig, TunnelConfig};

// Re-export identity types
pub use identity::{Identity, IdentityError, NodeKey};

// Re-export neighbor types
pub use neighbor::{Neighbor, NeighborState, NeighborTable, TunnelSlot};

// Re-export protocol types
pub use protocol::{HelloMessage, Message, MessageMetadata, ProtocolError, TunnelMessage};

// Re-export engine types
pub use node::{Node, NodeError};

// Re-export transport types
pub use transport::{
    payload_channel, PayloadRx, PayloadTx, ReceivedPayload, Transport, TransportError,
};
pub use transport::udp::UdpTransport;

// Re-export tunnel types
pub use tunnel::{
    generate_tunnel_keypair, ProvisionRequest, TunnelError, TunnelProvisioner, WgDeviceConfig,
    WgPeerConfig, WgProvisioner,
};
