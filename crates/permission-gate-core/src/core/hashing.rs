// crates/permission-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Permission Gate Canonical Encoding
// Description: RFC 8785 JSON canonicalization, SHA-256 digests, hex encoding.
// Purpose: Provide deterministic bytes for delegations and signatures.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Delegations are encoded as RFC 8785 (JCS) canonical JSON so that signing
//! and verification always see identical bytes. Binary values travel as
//! lowercase, `0x`-prefixed hex.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while encoding values.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Hex input was malformed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// Decoded bytes were not the expected JSON document.
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
}

// ============================================================================
// SECTION: Canonical JSON
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`EncodingError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    serde_jcs::to_vec(value).map_err(|err| EncodingError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string with a `0x` prefix.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

/// Decodes a hex string, with or without a `0x` prefix.
///
/// # Errors
///
/// Returns [`EncodingError::InvalidHex`] for odd lengths or non-hex digits.
pub fn hex_decode(value: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if !digits.len().is_multiple_of(2) {
        return Err(EncodingError::InvalidHex("odd number of digits".to_string()));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let high = hex_digit(pair[0])?;
            let low = hex_digit(pair[1])?;
            Ok((high << 4) | low)
        })
        .collect()
}

/// Decodes one hex digit.
fn hex_digit(digit: u8) -> Result<u8, EncodingError> {
    char::from(digit)
        .to_digit(16)
        .and_then(|value| u8::try_from(value).ok())
        .ok_or_else(|| EncodingError::InvalidHex(format!("unexpected digit `{}`", char::from(digit))))
}

/// Encodes an unsigned integer as a big-endian word of `width` bytes (hex digits only).
///
/// Values wider than the word are truncated to the low-order bytes.
#[must_use]
pub fn hex_word(value: u128, width: usize) -> String {
    let bytes = value.to_be_bytes();
    let mut word = vec![0u8; width];
    let take = width.min(bytes.len());
    word[width - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    hex_encode(&word).split_off(2)
}
