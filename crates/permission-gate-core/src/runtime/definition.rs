// crates/permission-gate-core/src/runtime/definition.rs
// ============================================================================
// Module: Permission Type Definitions
// Description: Contract implemented by each permission type.
// Purpose: Let one lifecycle engine host any permission type.
// Dependencies: async-trait, crate::{core, interfaces, runtime::rules}
// ============================================================================

//! ## Overview
//! A [`PermissionDefinition`] supplies everything type-specific: request
//! validation, context construction, metadata derivation, confirmation
//! content, folding edits back into the request, defaults, caveats, and the
//! rule descriptors rendered as form fields. Definitions are selected once by
//! permission type when a handler is built.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::Address;
use crate::core::Caveat;
use crate::core::ChainId;
use crate::core::Component;
use crate::core::DelegationEnvironment;
use crate::core::InterfaceId;
use crate::core::Permission;
use crate::core::PermissionRequest;
use crate::core::PermissionType;
use crate::interfaces::EventDispatcher;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HandlerRegistration;
use crate::interfaces::HostError;
use crate::runtime::rules::RuleDescriptor;

// ============================================================================
// SECTION: Context and Metadata
// ============================================================================

/// UI-facing snapshot of a permission's (possibly edited) terms.
///
/// Contexts are replaced wholesale on every edit and never mutated in place.
pub trait PermissionContext: Clone + Send + Sync + 'static {
    /// Justification supplied by the requesting party.
    fn justification(&self) -> &str;

    /// Whether the user may adjust the terms at all.
    fn is_adjustment_allowed(&self) -> bool;

    /// Account granting the permission.
    fn account_address(&self) -> &Address;
}

/// Ephemeral validation and display state derived from a context.
pub trait PermissionMetadata: Send + Sync + 'static {
    /// Validation errors keyed by field name (invalid fields only).
    fn validation_errors(&self) -> &BTreeMap<String, String>;

    /// Returns true when no field is invalid.
    fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by permission-type definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The request or an edit is invalid.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The definition is internally inconsistent.
    #[error("definition misconfigured: {0}")]
    Configuration(String),
    /// A host lookup failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

// ============================================================================
// SECTION: Context Plumbing
// ============================================================================

/// Reads the latest committed context.
pub type ContextReader<C> = Arc<dyn Fn() -> C + Send + Sync>;

/// Edit applied to the latest committed context.
pub type ContextEdit<C> = Box<dyn FnOnce(&C) -> C + Send>;

/// Commits an edit against the latest context and re-renders.
///
/// The edit is committed when the publisher is called, before the returned
/// future is polled, so edits land in the order they were published.
pub type ContextPublisher<C> = Arc<dyn Fn(ContextEdit<C>) -> HandlerFuture + Send + Sync>;

/// Re-renders the current context without changing it.
pub type RenderTrigger = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Session-owned cell holding the current context and its generation.
///
/// # Invariants
/// - Every replacement or update bumps the generation by one.
pub struct ContextCell<C> {
    /// Generation counter and current context.
    value: Mutex<(u64, C)>,
}

impl<C: Clone> ContextCell<C> {
    /// Creates a cell holding the initial context at generation zero.
    #[must_use]
    pub const fn new(context: C) -> Self {
        Self {
            value: Mutex::new((0, context)),
        }
    }

    /// Returns the current context.
    #[must_use]
    pub fn get(&self) -> C {
        self.value.lock().unwrap_or_else(PoisonError::into_inner).1.clone()
    }

    /// Returns the current generation and context.
    #[must_use]
    pub fn snapshot(&self) -> (u64, C) {
        let guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        (guard.0, guard.1.clone())
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.value.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Replaces the context and returns the new generation.
    pub fn replace(&self, context: C) -> u64 {
        let mut guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        guard.0 += 1;
        guard.1 = context;
        guard.0
    }

    /// Applies `edit` to the current context under the lock and returns the
    /// new generation.
    pub fn update(&self, edit: impl FnOnce(&C) -> C) -> u64 {
        let mut guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        let next = edit(&guard.1);
        guard.0 += 1;
        guard.1 = next;
        guard.0
    }
}

// ============================================================================
// SECTION: Definition Inputs
// ============================================================================

/// Inputs for building the initial context.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuildInput<'a> {
    /// Validated request.
    pub request: &'a PermissionRequest,
    /// Resolved chain.
    pub chain_id: ChainId,
    /// Accounts available for selection.
    pub accounts: &'a [Address],
    /// Requesting origin.
    pub origin: &'a str,
}

/// Inputs for rendering confirmation content.
#[derive(Debug)]
pub struct ContentInput<'a, C, M> {
    /// Current context.
    pub context: &'a C,
    /// Metadata derived from `context`.
    pub metadata: &'a M,
    /// Requesting origin.
    pub origin: &'a str,
    /// Resolved chain.
    pub chain_id: ChainId,
}

impl<C, M> Clone for ContentInput<'_, C, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, M> Copy for ContentInput<'_, C, M> {}

/// Handles given to a definition for type-specific event bindings.
#[derive(Clone)]
pub struct DefinitionBindings<C> {
    /// Surface the bindings are scoped to.
    pub interface_id: InterfaceId,
    /// Event dispatcher.
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Reads the latest committed context.
    pub get_context: ContextReader<C>,
    /// Commits context edits.
    pub on_context_changed: ContextPublisher<C>,
}

// ============================================================================
// SECTION: Permission Definition
// ============================================================================

/// Type-specific behavior hosted by the lifecycle engine.
#[async_trait]
pub trait PermissionDefinition: Send + Sync + 'static {
    /// Context type.
    type Context: PermissionContext;
    /// Metadata type.
    type Metadata: PermissionMetadata;

    /// Permission type handled by this definition.
    fn permission_type(&self) -> PermissionType;

    /// Rule descriptors rendered as form fields.
    fn rules(&self) -> Vec<Arc<RuleDescriptor<Self::Context, Self::Metadata>>>;

    /// Validates the raw request.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Validation`] when the request is malformed.
    async fn validate_request(
        &self,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, DefinitionError>;

    /// Builds the initial context from the validated request.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when lookups or conversions fail.
    async fn build_context(
        &self,
        input: ContextBuildInput<'_>,
    ) -> Result<Self::Context, DefinitionError>;

    /// Derives validation and display metadata from a context.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when derivation fails.
    async fn derive_metadata(
        &self,
        context: &Self::Context,
    ) -> Result<Self::Metadata, DefinitionError>;

    /// Renders the type-specific confirmation body.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when the content cannot be built.
    fn create_confirmation_content(
        &self,
        input: ContentInput<'_, Self::Context, Self::Metadata>,
    ) -> Result<Component, DefinitionError>;

    /// Folds the final context back into a new request.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when the context cannot be converted.
    async fn apply_context(
        &self,
        context: &Self::Context,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, DefinitionError>;

    /// Fills defaults for unset optional permission fields.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when defaults cannot be resolved.
    async fn populate_permission(
        &self,
        permission: &Permission,
    ) -> Result<Permission, DefinitionError>;

    /// Builds the type-specific caveats.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when caveats cannot be built.
    async fn create_permission_caveats(
        &self,
        permission: &Permission,
        chain_id: ChainId,
        environment: &DelegationEnvironment,
    ) -> Result<Vec<Caveat>, DefinitionError>;

    /// Binds type-specific event handlers (for example account changes).
    fn bind_handlers(
        &self,
        _bindings: DefinitionBindings<Self::Context>,
    ) -> Vec<HandlerRegistration> {
        Vec::new()
    }
}
