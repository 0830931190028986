// crates/permission-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Permission Gate Interfaces
// Description: Contracts for host dialogs, events, signing, and account services.
// Purpose: Define the external collaborators consumed by the runtime.
// Dependencies: async-trait, crate::core
// ============================================================================

//! ## Overview
//! Interfaces describe how the confirmation engine talks to its host without
//! embedding host details. Every host call may fail; failures surface as
//! [`HostError`] and the runtime decides per call site whether they are fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::Address;
use crate::core::ChainId;
use crate::core::Component;
use crate::core::Delegation;
use crate::core::DelegationSignature;
use crate::core::InterfaceId;
use crate::core::PermissionType;

// ============================================================================
// SECTION: Host Errors
// ============================================================================

/// Opaque failure reported by a host service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host error: {0}")]
pub struct HostError(pub String);

impl HostError {
    /// Creates a host error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ============================================================================
// SECTION: Host Dialog
// ============================================================================

/// Host service that renders and presents dialog surfaces.
#[async_trait]
pub trait HostDialog: Send + Sync {
    /// Creates a surface and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the host rejects the surface.
    async fn create_surface(&self, ui: &Component) -> Result<InterfaceId, HostError>;

    /// Replaces the content of an existing surface.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the surface cannot be updated.
    async fn update_surface(&self, id: &InterfaceId, ui: &Component) -> Result<(), HostError>;

    /// Presents a surface and settles when it is dismissed or resolved.
    ///
    /// Resolves with `None` when the user dismisses the surface.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when presentation fails.
    async fn present_surface(&self, id: &InterfaceId) -> Result<Option<Value>, HostError>;

    /// Resolves a presented surface programmatically.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the surface is absent or already resolved.
    async fn resolve_surface(&self, id: &InterfaceId, value: Value) -> Result<(), HostError>;
}

// ============================================================================
// SECTION: Event Dispatcher
// ============================================================================

/// Kind of user input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEventKind {
    /// A button was clicked.
    ButtonClick,
    /// A field value changed.
    InputChange,
}

/// Routing key for an event handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventBinding {
    /// Element name the handler listens to.
    pub element_name: String,
    /// Event kind the handler listens to.
    pub event_kind: UserEventKind,
    /// Surface the handler is scoped to.
    pub interface_id: InterfaceId,
}

impl EventBinding {
    /// Creates a new binding key.
    #[must_use]
    pub fn new(
        element_name: impl Into<String>,
        event_kind: UserEventKind,
        interface_id: InterfaceId,
    ) -> Self {
        Self {
            element_name: element_name.into(),
            event_kind,
            interface_id,
        }
    }
}

/// User input event delivered to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInputEvent {
    /// Element that produced the event.
    pub element_name: String,
    /// Event kind.
    pub event_kind: UserEventKind,
    /// Surface that produced the event.
    pub interface_id: InterfaceId,
    /// Event value (field contents for input changes).
    pub value: Option<Value>,
}

impl UserInputEvent {
    /// Returns the event value as a string when it is a non-null scalar.
    #[must_use]
    pub fn value_as_string(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }
}

/// Boxed future returned by event handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Shared event handler.
pub type EventHandler = Arc<dyn Fn(UserInputEvent) -> HandlerFuture + Send + Sync>;

/// Receipt for a bound handler, used to unbind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRegistration {
    /// Dispatcher-assigned registration number.
    pub id: u64,
    /// Routing key the handler was bound to.
    pub binding: EventBinding,
}

/// Event dispatcher delivering user input to bound handlers.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Binds a handler to a routing key.
    fn on(&self, binding: EventBinding, handler: EventHandler) -> HandlerRegistration;

    /// Unbinds a previously bound handler. Unknown registrations are ignored.
    fn off(&self, registration: &HandlerRegistration);

    /// Resolves once every currently queued handler has run to completion.
    async fn wait_for_pending_handlers(&self);
}

// ============================================================================
// SECTION: Signing and Nonces
// ============================================================================

/// Inputs for a delegation signature.
#[derive(Debug, Clone, Copy)]
pub struct SignDelegationRequest<'a> {
    /// Chain the delegation is valid on.
    pub chain_id: ChainId,
    /// Delegation to sign.
    pub delegation: &'a Delegation,
    /// Account signing the delegation.
    pub address: &'a Address,
    /// Origin of the permission request (audit only).
    pub origin: &'a str,
    /// Justification shown to the user (audit only).
    pub justification: &'a str,
}

/// Signer producing delegation signatures.
#[async_trait]
pub trait DelegationSigner: Send + Sync {
    /// Signs a delegation on behalf of the delegator account.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when signing fails.
    async fn sign_delegation(
        &self,
        request: SignDelegationRequest<'_>,
    ) -> Result<DelegationSignature, HostError>;
}

/// Service issuing single-use nonces.
#[async_trait]
pub trait NonceService: Send + Sync {
    /// Returns the current nonce for the account on the chain.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the nonce cannot be fetched.
    async fn nonce(&self, chain_id: ChainId, account: &Address) -> Result<u128, HostError>;
}

// ============================================================================
// SECTION: Accounts
// ============================================================================

/// Account service used for account selection and capability upgrades.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Returns the addresses available to the user.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when addresses cannot be resolved.
    async fn account_addresses(&self) -> Result<Vec<Address>, HostError>;

    /// Returns true when the account needs an on-chain capability upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the check fails.
    async fn requires_upgrade(
        &self,
        chain_id: ChainId,
        address: &Address,
    ) -> Result<bool, HostError>;

    /// Triggers the on-chain capability upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the upgrade fails.
    async fn upgrade_account(&self, chain_id: ChainId, address: &Address) -> Result<(), HostError>;
}

// ============================================================================
// SECTION: Introduction State
// ============================================================================

/// Persisted set of permission types whose introduction was already seen.
#[async_trait]
pub trait IntroductionStateStore: Send + Sync {
    /// Returns true when the introduction for the type was seen.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the state cannot be read.
    async fn has_seen(&self, permission_type: &PermissionType) -> Result<bool, HostError>;

    /// Records that the introduction for the type was seen.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the state cannot be written.
    async fn mark_seen(&self, permission_type: &PermissionType) -> Result<(), HostError>;
}
