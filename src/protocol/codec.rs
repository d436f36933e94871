//! Canonical wire encoding and signature discipline.
//!
//! Encoding produces the canonical body (type token, base64 public key,
//! type-specific fields, sequence number, space-joined), signs it, and
//! appends the base64 signature as the final token. Decoding reverses the
//! mapping, verifying the signature over everything before the signature
//! token before any field is trusted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::identity::{Identity, NodeKey, SIGNATURE_SIZE};

use super::error::ProtocolError;
use super::message::{
    HelloMessage, Message, MessageMetadata, TunnelMessage, TOKEN_HELLO, TOKEN_HELLO_CONFIRM,
    TOKEN_TUNNEL, TOKEN_TUNNEL_CONFIRM,
};

/// Token count of a Hello message including the signature.
const HELLO_TOKENS: usize = 5;

/// Token count of a Tunnel message including the signature.
const TUNNEL_TOKENS: usize = 6;

impl Message {
    /// Decode and verify a wire payload.
    ///
    /// Pure: never touches neighbor state.
    pub fn decode(payload: &str) -> Result<Message, ProtocolError> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        let Some(&token) = tokens.first() else {
            return Err(ProtocolError::MalformedMessage("empty payload".into()));
        };

        match token {
            TOKEN_HELLO | TOKEN_HELLO_CONFIRM => {
                HelloMessage::from_tokens(&tokens, token == TOKEN_HELLO_CONFIRM)
                    .map(Message::Hello)
            }
            TOKEN_TUNNEL | TOKEN_TUNNEL_CONFIRM => {
                TunnelMessage::from_tokens(&tokens, token == TOKEN_TUNNEL_CONFIRM)
                    .map(Message::Tunnel)
            }
            other => Err(ProtocolError::UnrecognizedMessageType(other.to_string())),
        }
    }

    /// Encode and sign either message family.
    pub fn encode(&self, identity: &Identity) -> Result<String, ProtocolError> {
        match self {
            Message::Hello(m) => m.encode(identity),
            Message::Tunnel(m) => m.encode(identity),
        }
    }
}

impl HelloMessage {
    /// Encode and sign this message.
    pub fn encode(&self, identity: &Identity) -> Result<String, ProtocolError> {
        if self.control_address.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty control address".into()));
        }

        let token = if self.metadata.confirm {
            TOKEN_HELLO_CONFIRM
        } else {
            TOKEN_HELLO
        };
        let body = format!(
            "{} {} {} {}",
            token,
            self.metadata.source_public_key.to_base64(),
            self.control_address,
            self.metadata.seqnum,
        );
        Ok(sign_body(body, identity))
    }

    fn from_tokens(tokens: &[&str], confirm: bool) -> Result<Self, ProtocolError> {
        let metadata = verify_metadata(tokens, HELLO_TOKENS, confirm)?;
        Ok(HelloMessage {
            metadata,
            control_address: tokens[2].to_string(),
        })
    }
}

impl TunnelMessage {
    /// Encode and sign this message.
    pub fn encode(&self, identity: &Identity) -> Result<String, ProtocolError> {
        if self.tunnel_public_key.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty tunnel public key".into()));
        }
        if self.tunnel_endpoint.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty tunnel endpoint".into()));
        }

        let token = if self.metadata.confirm {
            TOKEN_TUNNEL_CONFIRM
        } else {
            TOKEN_TUNNEL
        };
        let body = format!(
            "{} {} {} {} {}",
            token,
            self.metadata.source_public_key.to_base64(),
            self.tunnel_public_key,
            self.tunnel_endpoint,
            self.metadata.seqnum,
        );
        Ok(sign_body(body, identity))
    }

    fn from_tokens(tokens: &[&str], confirm: bool) -> Result<Self, ProtocolError> {
        let metadata = verify_metadata(tokens, TUNNEL_TOKENS, confirm)?;
        Ok(TunnelMessage {
            metadata,
            tunnel_public_key: tokens[2].to_string(),
            tunnel_endpoint: tokens[3].to_string(),
        })
    }
}

/// Append the base64 signature over `body` to form the wire string.
fn sign_body(body: String, identity: &Identity) -> String {
    let signature = identity.sign(body.as_bytes());
    format!("{} {}", body, BASE64.encode(signature))
}

/// Verify the signature and extract the shared metadata fields.
///
/// The signature (final token) is checked over every preceding token joined
/// by single spaces; only then is the sequence number parsed.
fn verify_metadata(
    tokens: &[&str],
    expected: usize,
    confirm: bool,
) -> Result<MessageMetadata, ProtocolError> {
    if tokens.len() != expected {
        return Err(ProtocolError::MalformedMessage(format!(
            "expected {} fields, got {}",
            expected,
            tokens.len()
        )));
    }

    let source_public_key = NodeKey::from_base64(tokens[1])
        .map_err(|e| ProtocolError::MalformedMessage(format!("bad public key: {}", e)))?;

    let signature = BASE64
        .decode(tokens[expected - 1])
        .map_err(|e| ProtocolError::MalformedMessage(format!("bad signature encoding: {}", e)))?;
    let signature: [u8; SIGNATURE_SIZE] =
        signature
            .try_into()
            .map_err(|v: Vec<u8>| ProtocolError::MalformedMessage(format!(
                "bad signature length: {}",
                v.len()
            )))?;

    let body = tokens[..expected - 1].join(" ");
    if !source_public_key.verify(body.as_bytes(), &signature) {
        return Err(ProtocolError::SignatureInvalid);
    }

    let seqnum: u64 = tokens[expected - 2]
        .parse()
        .map_err(|_| ProtocolError::MalformedMessage("unparseable sequence number".into()))?;

    Ok(MessageMetadata {
        source_public_key,
        seqnum,
        signature,
        confirm,
    })
}
