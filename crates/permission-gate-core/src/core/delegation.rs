// crates/permission-gate-core/src/core/delegation.rs
// ============================================================================
// Module: Delegations and Caveats
// Description: Delegation, caveat, and signed delegation data structures.
// Purpose: Build the caveat-constrained authorization object produced on grant.
// Dependencies: rand, serde, crate::core::hashing
// ============================================================================

//! ## Overview
//! A [`Delegation`] grants a bounded capability from the delegator (the user's
//! account) to the delegate (the requesting signer). Every delegation carries
//! an expiry caveat and a single-use nonce caveat in addition to the caveats
//! built by the permission type.
//! Invariants:
//! - Salts are 32 bytes from the OS RNG and never derived from user input.
//! - Caveat terms are fixed-width big-endian words.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::EncodingError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hex_decode;
use crate::core::hashing::hex_encode;
use crate::core::hashing::hex_word;
use crate::core::identifiers::Address;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Authority value marking a root delegation (no parent delegation).
pub const ROOT_AUTHORITY: &str = "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// Width of a caveat term word in bytes.
const WORD_BYTES: usize = 32;

/// Width of each timestamp threshold in bytes.
const TIMESTAMP_THRESHOLD_BYTES: usize = 16;

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Contract addresses used to build and redeem delegations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationEnvironment {
    /// Delegation manager contract.
    pub delegation_manager: Address,
    /// Timestamp enforcer contract (expiry caveat).
    pub timestamp_enforcer: Address,
    /// Nonce enforcer contract (single-use caveat).
    pub nonce_enforcer: Address,
}

// ============================================================================
// SECTION: Caveats
// ============================================================================

/// Enforcement clause attached to a delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    /// Enforcer contract address.
    pub enforcer: Address,
    /// Hex-encoded enforcer terms.
    pub terms: String,
    /// Hex-encoded redemption arguments.
    pub args: String,
}

impl Caveat {
    /// Creates a caveat with empty redemption arguments.
    #[must_use]
    pub fn new(enforcer: Address, terms: impl Into<String>) -> Self {
        Self {
            enforcer,
            terms: terms.into(),
            args: "0x".to_string(),
        }
    }

    /// Builds the expiry caveat: valid from `0` until (exclusive) `expiry` seconds.
    #[must_use]
    pub fn timestamp(enforcer: Address, expiry: u64) -> Self {
        let after = hex_word(0, TIMESTAMP_THRESHOLD_BYTES);
        let before = hex_word(u128::from(expiry), TIMESTAMP_THRESHOLD_BYTES);
        Self::new(enforcer, format!("0x{after}{before}"))
    }

    /// Builds the single-use nonce caveat.
    #[must_use]
    pub fn nonce(enforcer: Address, nonce: u128) -> Self {
        Self::new(enforcer, format!("0x{}", hex_word(nonce, WORD_BYTES)))
    }
}

// ============================================================================
// SECTION: Delegation
// ============================================================================

/// Unsigned delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Delegate (the requesting signer).
    pub delegate: Address,
    /// Delegator (the user's account).
    pub delegator: Address,
    /// Parent authority; [`ROOT_AUTHORITY`] for root delegations.
    pub authority: String,
    /// Enforcement caveats.
    pub caveats: Vec<Caveat>,
    /// Hex-encoded random salt.
    pub salt: String,
}

/// Signature over a delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationSignature(String);

impl DelegationSignature {
    /// Wraps a hex-encoded signature.
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    /// Returns the signature as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delegation paired with its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDelegation {
    /// Delegation fields.
    #[serde(flatten)]
    pub delegation: Delegation,
    /// Delegator signature.
    pub signature: DelegationSignature,
}

impl SignedDelegation {
    /// Encodes the signed delegation as hex over its canonical JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] when canonicalization fails.
    pub fn encode(&self) -> Result<String, EncodingError> {
        canonical_json_bytes(self).map(|bytes| hex_encode(&bytes))
    }

    /// Decodes a value produced by [`SignedDelegation::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] when the hex or the JSON payload is malformed.
    pub fn decode(encoded: &str) -> Result<Self, EncodingError> {
        let bytes = hex_decode(encoded)?;
        serde_json::from_slice(&bytes).map_err(|err| EncodingError::InvalidJson(err.to_string()))
    }
}

/// Generates a fresh 32-byte random salt.
#[must_use]
pub fn generate_salt() -> String {
    let mut bytes = [0u8; WORD_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex_encode(&bytes)
}
