// crates/permission-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Permission Gate Identifiers
// Description: Strongly typed identifiers for chains, accounts, and surfaces.
// Purpose: Provide serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Identifiers used across the permission confirmation lifecycle. String-based
//! identifiers are opaque and serialize transparently. [`ChainId`] and
//! [`Address`] carry parsing helpers because they cross the request boundary in
//! hex form and must be normalized before they reach the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing identifiers from request input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Chain identifier is not a valid hex quantity.
    #[error("invalid chain id: {0}")]
    InvalidChainId(String),
    /// Address is not a 0x-prefixed 20-byte hex string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

// ============================================================================
// SECTION: Chain Identifier
// ============================================================================

/// Numeric EVM chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    /// Creates a chain identifier from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses a `0x`-prefixed hex quantity such as `0x1` or `0xaa36a7`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidChainId`] when the input is not a hex quantity.
    pub fn from_hex(value: &str) -> Result<Self, IdentifierError> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| IdentifierError::InvalidChainId(value.to_string()))?;
        if digits.is_empty() || digits.len() > 16 {
            return Err(IdentifierError::InvalidChainId(value.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| IdentifierError::InvalidChainId(value.to_string()))
    }

    /// Returns the chain id as a minimal `0x`-prefixed hex quantity.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Account Address
// ============================================================================

/// Account or contract address (20 bytes, lowercase hex with `0x` prefix).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses and normalizes an address.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidAddress`] when the input is malformed.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let digits = value
            .strip_prefix("0x")
            .ok_or_else(|| IdentifierError::InvalidAddress(value.to_string()))?;
        if digits.len() != 40 || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(IdentifierError::InvalidAddress(value.to_string()));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Opaque Identifiers
// ============================================================================

/// Host-assigned identifier of a rendered dialog surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Creates a new interface identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for InterfaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Permission type tag (for example `native-token-stream`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionType(String);

impl PermissionType {
    /// Creates a new permission type tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PermissionType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PermissionType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
