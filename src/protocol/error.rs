//! Protocol error types.

use thiserror::Error;

/// Errors related to protocol message handling.
///
/// All of these are per-message and non-fatal: a bad message is dropped and
/// the listener keeps running.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("sequence number {got} not above last accepted {last}")]
    ReplaySequenceNumber { got: u64, last: u64 },

    #[error("unrecognized message type: {0:?}")]
    UnrecognizedMessageType(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
