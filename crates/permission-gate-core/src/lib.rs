// crates/permission-gate-core/src/lib.rs
// ============================================================================
// Module: Permission Gate Core Library
// Description: Public API surface for the permission confirmation engine.
// Purpose: Expose core types, host interfaces, and the lifecycle runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Permission Gate mediates a third party's request for a bounded, revocable
//! permission against a user's account. It shows a confirmation surface, lets
//! the user adjust the terms while validating them continuously, and on
//! approval produces a signed, caveat-constrained delegation. Hosts plug in
//! through the traits in [`interfaces`]; permission types plug in through
//! [`runtime::PermissionDefinition`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AccountService;
pub use interfaces::DelegationSigner;
pub use interfaces::EventBinding;
pub use interfaces::EventDispatcher;
pub use interfaces::EventHandler;
pub use interfaces::HandlerFuture;
pub use interfaces::HandlerRegistration;
pub use interfaces::HostDialog;
pub use interfaces::HostError;
pub use interfaces::IntroductionStateStore;
pub use interfaces::NonceService;
pub use interfaces::SignDelegationRequest;
pub use interfaces::UserEventKind;
pub use interfaces::UserInputEvent;
pub use runtime::AuditSink;
pub use runtime::ConfirmationSession;
pub use runtime::DialogSession;
pub use runtime::InMemoryEventDispatcher;
pub use runtime::InMemoryIntroductionStateStore;
pub use runtime::LifecycleError;
pub use runtime::OrchestratorConfig;
pub use runtime::OrchestratorServices;
pub use runtime::PermissionDefinition;
pub use runtime::PermissionHandler;
pub use runtime::PermissionHandlerFactory;
pub use runtime::PermissionIntroductionService;
pub use runtime::PermissionRequestHandler;
pub use runtime::PermissionRequestLifecycleOrchestrator;
pub use runtime::TimeoutFactory;
