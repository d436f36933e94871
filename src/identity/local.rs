//! Local node identity with signing capability.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use super::encoding::read_key_file;
use super::{IdentityError, NodeKey, KEYPAIR_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// The local node's identity: keypair, message counter, and the control
/// addresses it advertises.
///
/// The sequence counter increases by one for every message this node signs
/// and sends, and is never reset; peers use it for replay protection.
/// `control_addresses` maps a network interface name to the address this
/// node advertises as reachable for control traffic on that interface.
pub struct Identity {
    signing_key: SigningKey,
    public_key: NodeKey,
    seqnum: AtomicU64,
    control_addresses: HashMap<String, String>,
}

impl Identity {
    /// Create a new random identity.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create an identity from an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = NodeKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            public_key,
            seqnum: AtomicU64::new(0),
            control_addresses: HashMap::new(),
        }
    }

    /// Create an identity from private key bytes.
    ///
    /// Accepts either a 32-byte seed or the 64-byte seed-plus-public-key
    /// layout used in key files.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        match bytes.len() {
            PUBLIC_KEY_SIZE => {
                let seed: [u8; PUBLIC_KEY_SIZE] =
                    bytes.try_into().map_err(|_| IdentityError::InvalidKeypair)?;
                Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
            }
            KEYPAIR_SIZE => {
                let pair: [u8; KEYPAIR_SIZE] =
                    bytes.try_into().map_err(|_| IdentityError::InvalidKeypair)?;
                let signing_key = SigningKey::from_keypair_bytes(&pair)
                    .map_err(|_| IdentityError::InvalidKeypair)?;
                Ok(Self::from_signing_key(signing_key))
            }
            got => Err(IdentityError::InvalidKeyLength {
                expected: KEYPAIR_SIZE,
                got,
            }),
        }
    }

    /// Load an identity from a pair of base64 key files.
    ///
    /// The public key file must match the key derived from the private key
    /// file; a mismatch means the operator mixed up key material.
    pub fn from_key_files(
        public_key_file: &Path,
        private_key_file: &Path,
    ) -> Result<Self, IdentityError> {
        let private = read_key_file(private_key_file)?;
        let identity = Self::from_private_bytes(&private)?;

        let public = read_key_file(public_key_file)?;
        if public.as_slice() != identity.public_key.as_bytes() {
            return Err(IdentityError::KeyMismatch);
        }

        Ok(identity)
    }

    /// Return the public key.
    pub fn public_key(&self) -> NodeKey {
        self.public_key
    }

    /// Return the 64-byte private key file payload (seed plus public key).
    pub fn keypair_bytes(&self) -> [u8; KEYPAIR_SIZE] {
        self.signing_key.to_keypair_bytes()
    }

    /// Sign data with this identity's private key.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(data).to_bytes()
    }

    /// Claim the next outbound sequence number.
    ///
    /// Atomic with respect to concurrent senders; every call returns a
    /// distinct, strictly increasing value.
    pub fn next_seqnum(&self) -> u64 {
        self.seqnum.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently claimed sequence number.
    pub fn current_seqnum(&self) -> u64 {
        self.seqnum.load(Ordering::SeqCst)
    }

    /// The control address advertised on `interface`, if configured.
    pub fn control_address(&self, interface: &str) -> Option<&str> {
        self.control_addresses.get(interface).map(String::as_str)
    }

    /// Set the control address advertised on `interface`.
    pub fn set_control_address(&mut self, interface: impl Into<String>, addr: impl Into<String>) {
        self.control_addresses.insert(interface.into(), addr.into());
    }

    /// Builder form of [`set_control_address`](Self::set_control_address).
    pub fn with_control_address(
        mut self,
        interface: impl Into<String>,
        addr: impl Into<String>,
    ) -> Self {
        self.set_control_address(interface, addr);
        self
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .field("seqnum", &self.current_seqnum())
            .field("control_addresses", &self.control_addresses)
            .finish_non_exhaustive()
    }
}
