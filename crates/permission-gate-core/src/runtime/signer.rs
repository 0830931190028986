// crates/permission-gate-core/src/runtime/signer.rs
// ============================================================================
// Module: Ed25519 Delegation Signer
// Description: Local signer producing ed25519 signatures over delegations.
// Purpose: Provide a self-contained signer for hosts without a keyring.
// Dependencies: async-trait, ed25519-dalek, serde, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`Ed25519DelegationSigner`] signs the SHA-256 digest of the canonical JSON
//! of `{ chainId, delegation }` with a single ed25519 key. Binding the chain id
//! into the message keeps a delegation signed for one chain from verifying on
//! another.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use serde::Serialize;

use crate::core::ChainId;
use crate::core::Delegation;
use crate::core::DelegationSignature;
use crate::core::canonical_json_bytes;
use crate::core::hex_decode;
use crate::core::hex_encode;
use crate::core::sha256;
use crate::interfaces::DelegationSigner;
use crate::interfaces::HostError;
use crate::interfaces::SignDelegationRequest;

// ============================================================================
// SECTION: Signing Payload
// ============================================================================

/// Message signed for a delegation.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningPayload<'a> {
    /// Chain the delegation is valid on.
    chain_id: ChainId,
    /// Delegation being signed.
    delegation: &'a Delegation,
}

/// Returns the digest signed for a delegation.
fn signing_message(chain_id: ChainId, delegation: &Delegation) -> Result<[u8; 32], HostError> {
    let bytes = canonical_json_bytes(&SigningPayload {
        chain_id,
        delegation,
    })
    .map_err(|err| HostError::new(err.to_string()))?;
    Ok(sha256(&bytes))
}

// ============================================================================
// SECTION: Signer
// ============================================================================

/// Ed25519 signer holding one signing key.
pub struct Ed25519DelegationSigner {
    /// Signing key.
    key: SigningKey,
}

impl Ed25519DelegationSigner {
    /// Creates a signer from a 32-byte secret key.
    #[must_use]
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    /// Returns the verifying key for published signatures.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

#[async_trait]
impl DelegationSigner for Ed25519DelegationSigner {
    async fn sign_delegation(
        &self,
        request: SignDelegationRequest<'_>,
    ) -> Result<DelegationSignature, HostError> {
        let message = signing_message(request.chain_id, request.delegation)?;
        let signature = self.key.sign(&message);
        Ok(DelegationSignature::new(hex_encode(&signature.to_bytes())))
    }
}

/// Verifies a signature produced by [`Ed25519DelegationSigner`].
///
/// # Errors
///
/// Returns [`HostError`] when the signature is malformed or does not verify.
pub fn verify_delegation_signature(
    key: &VerifyingKey,
    chain_id: ChainId,
    delegation: &Delegation,
    signature: &DelegationSignature,
) -> Result<(), HostError> {
    let message = signing_message(chain_id, delegation)?;
    let bytes = hex_decode(signature.as_str()).map_err(|err| HostError::new(err.to_string()))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|_| HostError::new("invalid signature bytes"))?;
    key.verify_strict(&message, &signature)
        .map_err(|_| HostError::new("signature verification failed"))
}
