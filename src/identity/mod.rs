//! Node identity
//!
//! Every node is identified by an Ed25519 keypair. The public key is the
//! node's identity on the wire; the private key signs every outbound
//! protocol message. Key material is exchanged as base64 (standard
//! alphabet) both on the wire and in key files.

mod encoding;
mod key;
mod local;

use std::path::PathBuf;

use thiserror::Error;

pub use encoding::{decode_key, encode_key, read_key_file};
pub use key::NodeKey;
pub use local::Identity;

/// Size of a public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Size of a private key file payload: 32-byte seed followed by the
/// 32-byte public key, the classic Ed25519 keypair layout.
pub const KEYPAIR_SIZE: usize = 64;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid base64 key encoding: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),

    #[error("inconsistent keypair bytes")]
    InvalidKeypair,

    #[error("public key file does not match the private key")]
    KeyMismatch,

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
