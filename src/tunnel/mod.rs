//! Tunnel provisioning
//!
//! Once a tunnel negotiation completes, the engine hands the agreed
//! parameters to a [`TunnelProvisioner`], which instantiates an encrypted
//! virtual interface and reports the effective configuration back for
//! verification. The concrete implementation drives the `ip` and `wg`
//! tools (see [`wireguard`]); the trait seam keeps the engine testable
//! without root privileges.

mod wireguard;

use async_trait::async_trait;
use thiserror::Error;

pub use wireguard::{generate_tunnel_keypair, WgProvisioner};

/// Errors from tunnel provisioning.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// An external command failed to run or exited nonzero.
    #[error("command `{command}` failed: {message}")]
    ProvisioningExecutionFailed { command: String, message: String },

    /// The interface came up but its effective configuration does not
    /// match what was requested.
    #[error("effective tunnel configuration does not match request")]
    ProvisioningVerificationFailed,

    /// The tool's configuration dump could not be parsed.
    #[error("unparseable tunnel configuration: {0}")]
    ConfigParse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for provisioning one tunnel to one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Name of the virtual interface to create or replace.
    pub interface_name: String,
    /// Local WireGuard listen port.
    pub listen_port: u16,
    /// Local WireGuard private key (base64).
    pub private_key: String,
    /// The peer's WireGuard public key (base64).
    pub peer_public_key: String,
    /// The peer's WireGuard endpoint (host:port).
    pub peer_endpoint: String,
}

/// Peer section of an effective tunnel configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WgPeerConfig {
    pub public_key: String,
    pub allowed_ips: String,
    pub endpoint: String,
}

/// Effective tunnel configuration read back from the live interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WgDeviceConfig {
    pub private_key: String,
    pub listen_port: u16,
    pub peer: Option<WgPeerConfig>,
}

/// External collaborator that realizes a negotiated tunnel.
///
/// Invoked by the engine once per completed negotiation; may block on
/// external process execution, so the engine calls it without holding the
/// neighbor table lock.
#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    /// Create or replace the tunnel interface and verify the result.
    async fn provision(&self, request: &ProvisionRequest) -> Result<WgDeviceConfig, TunnelError>;
}
