// crates/permission-gate-core/src/core/mod.rs
// ============================================================================
// Module: Permission Gate Core Types
// Description: Request, delegation, identifier, and UI data structures.
// Purpose: Provide stable, serializable types shared by the runtime and hosts.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types are plain data: requests as received, responses as produced,
//! delegation building blocks, and the host-agnostic UI tree.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod delegation;
pub mod hashing;
pub mod identifiers;
pub mod request;
pub mod ui;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use delegation::Caveat;
pub use delegation::Delegation;
pub use delegation::DelegationEnvironment;
pub use delegation::DelegationSignature;
pub use delegation::ROOT_AUTHORITY;
pub use delegation::SignedDelegation;
pub use delegation::generate_salt;
pub use hashing::EncodingError;
pub use hashing::canonical_json_bytes;
pub use hashing::hex_decode;
pub use hashing::hex_encode;
pub use hashing::sha256;
pub use identifiers::Address;
pub use identifiers::ChainId;
pub use identifiers::IdentifierError;
pub use identifiers::InterfaceId;
pub use identifiers::PermissionType;
pub use request::DENIAL_REASON;
pub use request::EXPIRY_RULE_TYPE;
pub use request::Permission;
pub use request::PermissionRequest;
pub use request::PermissionResponse;
pub use request::PermissionResult;
pub use request::RequestRule;
pub use request::SignerData;
pub use request::SignerDescriptor;
pub use request::SignerMeta;
pub use ui::ButtonVariant;
pub use ui::Component;
pub use ui::Field;
pub use ui::FieldKind;
