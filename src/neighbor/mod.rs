//! Per-peer protocol state.
//!
//! A [`Neighbor`] is a remote node identified by its public key, tracked
//! with replay state and tunnel negotiation progress. Records are created
//! on first contact and live for the process lifetime; only the tunnel
//! negotiation markers ever decay (see [`NeighborTable::decay_stale_negotiations`]).

mod table;

use std::fmt;
use std::time::Instant;

pub use table::NeighborTable;

use crate::identity::NodeKey;

/// Handshake progress for a neighbor.
///
/// The implicit initial state is "unknown" (no record exists). Transitions
/// only move forward, except the documented decay of stale tunnel
/// negotiations back to `Mutual`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NeighborState {
    /// We have accepted at least one Hello from this peer.
    Greeted,
    /// The peer has confirmed one of our Hellos; both sides know each other.
    Mutual,
    /// A tunnel proposal is in flight (sent by us or received from the peer).
    TunnelProposed,
    /// The negotiation completed; provisioning is due or has failed.
    TunnelConfirmed,
    /// The tunnel interface is provisioned and verified.
    TunnelActive,
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NeighborState::Greeted => "greeted",
            NeighborState::Mutual => "mutual",
            NeighborState::TunnelProposed => "tunnel_proposed",
            NeighborState::TunnelConfirmed => "tunnel_confirmed",
            NeighborState::TunnelActive => "tunnel_active",
        };
        write!(f, "{}", s)
    }
}

/// Negotiated tunnel parameters for a neighbor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TunnelSlot {
    /// The peer's advertised WireGuard public key.
    pub peer_public_key: String,
    /// The peer's advertised WireGuard endpoint (host:port).
    pub peer_endpoint: String,
    /// Local listen port, set once provisioned.
    pub listen_port: Option<u16>,
    /// Local virtual interface name, set once provisioned.
    pub interface_name: Option<String>,
}

/// State tracked for one remote peer, keyed by its public key.
#[derive(Clone, Debug)]
pub struct Neighbor {
    /// The peer's identity key.
    pub public_key: NodeKey,
    /// Highest sequence number accepted from this peer, across both message
    /// families. `None` until the first message is accepted.
    pub last_accepted_seqnum: Option<u64>,
    /// Most recently confirmed reachable control address.
    pub control_address: String,
    /// Handshake progress.
    pub state: NeighborState,
    /// Tunnel negotiation parameters.
    pub tunnel: TunnelSlot,
    /// When `state` last changed, for negotiation decay.
    pub last_transition: Instant,
}

impl Neighbor {
    /// A fresh record for a peer seen for the first time.
    pub fn new(public_key: NodeKey) -> Self {
        Self {
            public_key,
            last_accepted_seqnum: None,
            control_address: String::new(),
            state: NeighborState::Greeted,
            tunnel: TunnelSlot::default(),
            last_transition: Instant::now(),
        }
    }

    /// Accept `candidate` as the next sequence number if it advances the
    /// replay window.
    ///
    /// Returns true and records the value iff it is strictly greater than
    /// the last accepted one, or no baseline exists yet (the first message
    /// from a peer is accepted regardless of value). A false return means
    /// replay, duplicate, or out-of-order delivery; the message must be
    /// dropped, never treated as fatal.
    pub fn try_advance(&mut self, candidate: u64) -> bool {
        match self.last_accepted_seqnum {
            Some(last) if candidate <= last => false,
            _ => {
                self.last_accepted_seqnum = Some(candidate);
                true
            }
        }
    }

    /// Advance the handshake state, never downgrading.
    pub fn advance_state(&mut self, target: NeighborState) {
        if target > self.state {
            self.state = target;
            self.last_transition = Instant::now();
        }
    }
}
