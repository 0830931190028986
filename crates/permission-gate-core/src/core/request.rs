// crates/permission-gate-core/src/core/request.rs
// ============================================================================
// Module: Permission Request Model
// Description: Inbound permission requests and produced permission responses.
// Purpose: Provide the immutable request shape and the signed response shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`PermissionRequest`] is received once and never mutated by the engine;
//! user edits are expressed as a definition-specific context and folded back
//! into a *new* request at finalization. The type-specific permission payload
//! stays as JSON so one engine can host any permission type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::Address;
use crate::core::identifiers::PermissionType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rule type tag of the mandatory expiry rule.
pub const EXPIRY_RULE_TYPE: &str = "expiry";

/// Reason returned when the user denies a permission request.
pub const DENIAL_REASON: &str = "Permission request denied";

// ============================================================================
// SECTION: Request
// ============================================================================

/// Signer that will exercise the granted permission (the delegate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerDescriptor {
    /// Signer kind (for example `account`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Signer payload.
    pub data: SignerData,
}

/// Signer payload carrying the delegate address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerData {
    /// Delegate address.
    pub address: Address,
}

/// Type-tagged permission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// Permission type tag.
    #[serde(rename = "type")]
    pub permission_type: PermissionType,
    /// Type-specific permission data.
    pub data: Value,
    /// Whether the user may adjust the requested terms.
    #[serde(default)]
    pub is_adjustment_allowed: bool,
}

/// Rule attached to a request (for example an expiry bound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRule {
    /// Rule type tag.
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Rule payload.
    pub data: Value,
    /// Whether the user may adjust this rule.
    #[serde(default)]
    pub is_adjustment_allowed: bool,
}

impl RequestRule {
    /// Builds an expiry rule for the provided unix timestamp (seconds).
    #[must_use]
    pub fn expiry(timestamp: u64, is_adjustment_allowed: bool) -> Self {
        Self {
            rule_type: EXPIRY_RULE_TYPE.to_string(),
            data: serde_json::json!({ "timestamp": timestamp }),
            is_adjustment_allowed,
        }
    }
}

/// Inbound permission request.
///
/// # Invariants
/// - Never mutated by the engine; edits produce a new value via `apply_context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Chain identifier as a hex quantity.
    pub chain_id: String,
    /// Optional explicit account requested by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Delegate signer.
    pub signer: SignerDescriptor,
    /// Requested permission.
    pub permission: Permission,
    /// Optional rules (expiry and friends).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RequestRule>>,
}

impl PermissionRequest {
    /// Returns the rule with the given type tag, if present.
    #[must_use]
    pub fn rule(&self, rule_type: &str) -> Option<&RequestRule> {
        self.rules.as_deref().and_then(|rules| rules.iter().find(|rule| rule.rule_type == rule_type))
    }

    /// Returns the expiry timestamp (seconds) when an expiry rule is present and well formed.
    #[must_use]
    pub fn expiry(&self) -> Option<u64> {
        self.rule(EXPIRY_RULE_TYPE)
            .and_then(|rule| rule.data.get("timestamp"))
            .and_then(Value::as_u64)
    }

    /// Returns a copy of this request with `rule` replacing any rule of the same type.
    #[must_use]
    pub fn with_rule(&self, rule: RequestRule) -> Self {
        let mut next = self.clone();
        let mut rules: Vec<RequestRule> = next
            .rules
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter(|existing| existing.rule_type != rule.rule_type)
            .collect();
        rules.push(rule);
        next.rules = Some(rules);
        next
    }

    /// Returns a copy of this request with every rule of `rule_type` removed.
    #[must_use]
    pub fn without_rule(&self, rule_type: &str) -> Self {
        let mut next = self.clone();
        if let Some(rules) = next.rules.as_mut() {
            rules.retain(|rule| rule.rule_type != rule_type);
        }
        next
    }
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Signer metadata returned with a granted permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerMeta {
    /// Delegation manager contract that redeems the delegation.
    pub delegation_manager: Address,
}

/// Signed permission response returned to the requesting party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    /// Chain identifier as a hex quantity.
    pub chain_id: String,
    /// Account that granted the permission (the delegator).
    pub address: Address,
    /// Delegate signer.
    pub signer: SignerDescriptor,
    /// Resolved permission (after user edits and defaults).
    pub permission: Permission,
    /// Resolved rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RequestRule>>,
    /// Hex-encoded signed delegation.
    pub context: String,
    /// Signer metadata.
    pub signer_meta: SignerMeta,
}

/// Result of a permission request lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionResult {
    /// The user granted the permission.
    Approved {
        /// Signed permission response.
        response: Box<PermissionResponse>,
    },
    /// The user denied the permission.
    Denied {
        /// Human-readable denial reason.
        reason: String,
    },
}

impl PermissionResult {
    /// Returns a denial carrying the standard reason.
    #[must_use]
    pub fn denied() -> Self {
        Self::Denied {
            reason: DENIAL_REASON.to_string(),
        }
    }

    /// Returns true when the permission was approved.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}
