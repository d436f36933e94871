//! Base64 key-file encoding.
//!
//! Key files hold a single base64 string: 32 bytes for a public key,
//! 64 bytes (seed followed by public key) for a private key.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::IdentityError;

/// Encode key bytes for a key file or log output.
pub fn encode_key(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 key material, tolerating surrounding whitespace.
pub fn decode_key(s: &str) -> Result<Vec<u8>, IdentityError> {
    Ok(BASE64.decode(s.trim())?)
}

/// Read and decode a base64 key file.
pub fn read_key_file(path: &Path) -> Result<Vec<u8>, IdentityError> {
    let contents = std::fs::read_to_string(path).map_err(|e| IdentityError::KeyFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    decode_key(&contents)
}
