//! Control protocol messages
//!
//! Wire format definitions for the signed neighbor-control protocol. Every
//! message is a UTF-8 line of space-separated tokens:
//!
//! ```text
//! hello          <base64 pubkey> <controlAddress> <seqnum> <base64 sig>
//! hello_confirm  <base64 pubkey> <controlAddress> <seqnum> <base64 sig>
//! tunnel         <base64 pubkey> <tunnelPubkey> <tunnelEndpoint> <seqnum> <base64 sig>
//! tunnel_confirm <base64 pubkey> <tunnelPubkey> <tunnelEndpoint> <seqnum> <base64 sig>
//! ```
//!
//! The Ed25519 signature covers every preceding token joined by single
//! spaces, exactly as transmitted. The `_confirm` token variants share the
//! field layout and signing rule of their base message and differ only in
//! the type token; in memory the distinction is the `confirm` flag on
//! [`MessageMetadata`].
//!
//! Decoding verifies the signature before anything else is trusted and is a
//! pure transform: it never touches neighbor state.

mod codec;
mod error;
mod message;

pub use error::ProtocolError;
pub use message::{
    HelloMessage, Message, MessageMetadata, TunnelMessage, TOKEN_HELLO, TOKEN_HELLO_CONFIRM,
    TOKEN_TUNNEL, TOKEN_TUNNEL_CONFIRM,
};
