// crates/permission-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Permission Gate Runtime
// Description: Confirmation sessions, rule engine, and lifecycle orchestration.
// Purpose: Drive permission requests from validation to a signed response.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! Runtime modules layer from leaf to root: the cancellable timer, the dialog
//! session, the confirmation session, the rule engine and add-rule modal, and
//! the lifecycle orchestrator with its per-type handlers. The introduction
//! overlay reuses the dialog session. Reference in-memory adapters and an
//! ed25519 signer let the engine run without a host.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod confirmation;
pub mod definition;
pub mod dialog;
pub mod dispatcher;
pub mod handler;
pub mod introduction;
pub mod orchestrator;
pub mod rule_modal;
pub mod rules;
pub mod signer;
pub mod store;
pub mod timer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::LifecycleAuditEvent;
pub use audit::LifecycleStage;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use confirmation::CANCEL_BUTTON;
pub use confirmation::ConfirmationError;
pub use confirmation::ConfirmationSession;
pub use confirmation::ConfirmationSessionParams;
pub use confirmation::ConfirmationSessionState;
pub use confirmation::Decision;
pub use confirmation::GRANT_BUTTON;
pub use confirmation::GrantPredicate;
pub use confirmation::PendingDecision;
pub use confirmation::SessionPhase;
pub use definition::ContentInput;
pub use definition::ContextBuildInput;
pub use definition::ContextCell;
pub use definition::ContextEdit;
pub use definition::ContextPublisher;
pub use definition::ContextReader;
pub use definition::DefinitionBindings;
pub use definition::DefinitionError;
pub use definition::PermissionContext;
pub use definition::PermissionDefinition;
pub use definition::PermissionMetadata;
pub use definition::RenderTrigger;
pub use dialog::CloseHandler;
pub use dialog::DialogSession;
pub use dispatcher::InMemoryEventDispatcher;
pub use handler::PermissionHandler;
pub use handler::PermissionHandlerFactory;
pub use handler::PermissionRequestHandler;
pub use introduction::INTRODUCTION_CONFIRM_BUTTON;
pub use introduction::INTRODUCTION_NEXT_BUTTON;
pub use introduction::INTRODUCTION_PAGE_1_DOT;
pub use introduction::INTRODUCTION_PAGE_2_DOT;
pub use introduction::IntroductionContent;
pub use introduction::IntroductionOutcome;
pub use introduction::IntroductionPage;
pub use introduction::PermissionIntroductionService;
pub use orchestrator::ConfirmationCreated;
pub use orchestrator::ContextUpdater;
pub use orchestrator::DEFAULT_CONFIRMATION_TIMEOUT;
pub use orchestrator::LifecycleError;
pub use orchestrator::LifecycleHandlers;
pub use orchestrator::OrchestratorConfig;
pub use orchestrator::OrchestratorServices;
pub use orchestrator::PermissionRequestLifecycleOrchestrator;
pub use rule_modal::ADD_RULE_TOGGLE;
pub use rule_modal::MetadataDeriver;
pub use rule_modal::MetadataFuture;
pub use rule_modal::RuleModalManager;
pub use rule_modal::RULE_SELECT;
pub use rule_modal::RULE_VALUE_INPUT;
pub use rule_modal::RuleModalParams;
pub use rule_modal::SAVE_RULE_BUTTON;
pub use rules::REMOVE_BUTTON_SUFFIX;
pub use rules::RuleBindings;
pub use rules::RuleData;
pub use rules::RuleDescriptor;
pub use rules::RuleError;
pub use rules::RuleFieldType;
pub use rules::RuleReader;
pub use rules::RuleUpdater;
pub use rules::bind_rule_handlers;
pub use rules::render_rule;
pub use rules::render_rules;
pub use signer::Ed25519DelegationSigner;
pub use signer::verify_delegation_signature;
pub use store::InMemoryIntroductionStateStore;
pub use timer::Timeout;
pub use timer::TimeoutFactory;
pub use timer::TimerError;
