//! Public key wrapper used to identify remote nodes.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::{IdentityError, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// A node's public identity key.
///
/// Used as the lookup key for neighbor state and as the source field of
/// every protocol message. Displayed as base64, the same form it takes on
/// the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey([u8; PUBLIC_KEY_SIZE]);

impl NodeKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its base64 wire form.
    pub fn from_base64(s: &str) -> Result<Self, IdentityError> {
        let bytes = BASE64.decode(s)?;
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|v: Vec<u8>| IdentityError::InvalidKeyLength {
                    expected: PUBLIC_KEY_SIZE,
                    got: v.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Encode as base64 (wire and key-file form).
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Verify a signature over `data` against this key.
    ///
    /// Returns false for signatures that do not verify and for key bytes
    /// that do not decode to a valid curve point.
    pub fn verify(&self, data: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(data, &Signature::from_bytes(signature)).is_ok()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self.short())
    }
}
