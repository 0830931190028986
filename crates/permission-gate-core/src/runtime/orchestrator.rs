// crates/permission-gate-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: Permission Request Lifecycle
// Description: Top-level state machine from inbound request to signed grant.
// Purpose: Validate, confirm with the user, and finalize a permission request.
// Dependencies: async-trait, thiserror, tokio, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`PermissionRequestLifecycleOrchestrator::orchestrate`] drives one request
//! through `Validating -> BuildingContext -> AwaitingDecision`, then either
//! returns a denial or finalizes: apply the edited context, populate defaults,
//! build caveats, append the mandatory expiry and nonce caveats, sign the
//! delegation, and assemble the response.
//! Invariants:
//! - Any failure after the confirmation surface exists closes it before the
//!   error propagates.
//! - Renders always read the latest committed context; a render computed for
//!   a superseded context is dropped.
//! - `on_confirmation_resolved` runs exactly once per pass, on every path.
//! - Account upgrade failures are recorded and ignored; every other
//!   finalization failure aborts the pass with no partial response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::Address;
use crate::core::Caveat;
use crate::core::ChainId;
use crate::core::Component;
use crate::core::Delegation;
use crate::core::DelegationEnvironment;
use crate::core::EncodingError;
use crate::core::InterfaceId;
use crate::core::Permission;
use crate::core::PermissionRequest;
use crate::core::PermissionResponse;
use crate::core::PermissionResult;
use crate::core::PermissionType;
use crate::core::ROOT_AUTHORITY;
use crate::core::SignedDelegation;
use crate::core::SignerMeta;
use crate::core::generate_salt;
use crate::interfaces::AccountService;
use crate::interfaces::DelegationSigner;
use crate::interfaces::EventDispatcher;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HostDialog;
use crate::interfaces::HostError;
use crate::interfaces::NonceService;
use crate::interfaces::SignDelegationRequest;
use crate::runtime::audit::AuditOutcome;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::LifecycleAuditEvent;
use crate::runtime::audit::LifecycleStage;
use crate::runtime::confirmation::ConfirmationError;
use crate::runtime::confirmation::ConfirmationSession;
use crate::runtime::confirmation::ConfirmationSessionParams;
use crate::runtime::confirmation::GrantPredicate;
use crate::runtime::definition::ContentInput;
use crate::runtime::definition::ContextBuildInput;
use crate::runtime::definition::ContextCell;
use crate::runtime::definition::ContextEdit;
use crate::runtime::definition::ContextPublisher;
use crate::runtime::definition::ContextReader;
use crate::runtime::definition::DefinitionError;
use crate::runtime::definition::PermissionContext;
use crate::runtime::definition::PermissionMetadata;
use crate::runtime::definition::RenderTrigger;
use crate::runtime::rules::RuleError;
use crate::runtime::timer::TimeoutFactory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default time the user has to decide.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that abort a lifecycle pass.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The request is malformed.
    #[error("invalid permission request: {0}")]
    Validation(String),
    /// The request targets a chain outside the supported set.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(ChainId),
    /// An API was used out of order.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// A permission-type definition is inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A referenced rule no longer resolves.
    #[error("not found: {0}")]
    NotFound(String),
    /// The user did not decide in time.
    #[error("permission confirmation timed out")]
    Timeout,
    /// The confirmation was aborted programmatically.
    #[error("permission confirmation aborted: {0}")]
    Aborted(String),
    /// The finalized request has no expiry rule.
    #[error("permission request has no expiry rule")]
    MissingExpiry,
    /// The handler already drove a request.
    #[error("permission handler already handled a request")]
    AlreadyHandled,
    /// The signed delegation could not be encoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// A host service failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<DefinitionError> for LifecycleError {
    fn from(err: DefinitionError) -> Self {
        match err {
            DefinitionError::Validation(message) => Self::Validation(message),
            DefinitionError::Configuration(message) => Self::Configuration(message),
            DefinitionError::Host(err) => Self::Host(err),
        }
    }
}

impl From<ConfirmationError> for LifecycleError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::IllegalState(message) => Self::IllegalState(message),
            ConfirmationError::Timeout => Self::Timeout,
            ConfirmationError::Aborted(reason) => Self::Aborted(reason),
            ConfirmationError::Host(err) => Self::Host(err),
        }
    }
}

impl From<RuleError> for LifecycleError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Configuration(message) => Self::Configuration(message),
            RuleError::NotFound(message) => Self::NotFound(message),
            RuleError::Metadata(message) => Self::Validation(message),
        }
    }
}

// ============================================================================
// SECTION: Configuration and Services
// ============================================================================

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Chains requests may target.
    pub supported_chains: BTreeSet<ChainId>,
    /// Time the user has to decide.
    pub confirmation_timeout: Duration,
    /// Contract addresses used for delegations.
    pub environment: DelegationEnvironment,
}

impl OrchestratorConfig {
    /// Creates a config with the default timeout.
    #[must_use]
    pub fn new(
        supported_chains: impl IntoIterator<Item = ChainId>,
        environment: DelegationEnvironment,
    ) -> Self {
        Self {
            supported_chains: supported_chains.into_iter().collect(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            environment,
        }
    }
}

/// External collaborators used by the orchestrator.
#[derive(Clone)]
pub struct OrchestratorServices {
    /// Host dialog service.
    pub host: Arc<dyn HostDialog>,
    /// Event dispatcher.
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Account service.
    pub accounts: Arc<dyn AccountService>,
    /// Delegation signer.
    pub signer: Arc<dyn DelegationSigner>,
    /// Nonce service.
    pub nonces: Arc<dyn NonceService>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
}

// ============================================================================
// SECTION: Lifecycle Handlers
// ============================================================================

/// Handles passed to the confirmation-created hook.
pub struct ConfirmationCreated<C> {
    /// Surface every binding must be scoped to.
    pub interface_id: InterfaceId,
    /// Event dispatcher.
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Context accessor and publisher for this session.
    pub updater: ContextUpdater<C>,
    /// Audit sink for failures inside session handlers.
    pub audit: Arc<dyn AuditSink>,
}

/// Per-type callbacks driven by the orchestrator.
#[async_trait]
pub trait LifecycleHandlers: Send + Sync + 'static {
    /// Context type.
    type Context: PermissionContext;
    /// Metadata type.
    type Metadata: PermissionMetadata;

    /// Permission type being handled.
    fn permission_type(&self) -> PermissionType;

    /// Validates the raw request.
    async fn validate_request(
        &self,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, LifecycleError>;

    /// Builds the initial context.
    async fn build_context(
        &self,
        input: ContextBuildInput<'_>,
    ) -> Result<Self::Context, LifecycleError>;

    /// Derives metadata from a context.
    async fn derive_metadata(
        &self,
        context: &Self::Context,
    ) -> Result<Self::Metadata, LifecycleError>;

    /// Builds the full confirmation content.
    async fn create_confirmation_content(
        &self,
        input: ContentInput<'_, Self::Context, Self::Metadata>,
    ) -> Result<Component, LifecycleError>;

    /// Folds the final context into a new request.
    async fn apply_context(
        &self,
        context: &Self::Context,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, LifecycleError>;

    /// Fills defaults for unset optional fields.
    async fn populate_permission(&self, permission: &Permission)
    -> Result<Permission, LifecycleError>;

    /// Builds type-specific caveats.
    async fn create_permission_caveats(
        &self,
        permission: &Permission,
        chain_id: ChainId,
        environment: &DelegationEnvironment,
    ) -> Result<Vec<Caveat>, LifecycleError>;

    /// Attaches event bindings once the surface id is known.
    async fn on_confirmation_created(
        &self,
        _created: ConfirmationCreated<Self::Context>,
    ) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Releases bindings; runs once on every terminal path.
    async fn on_confirmation_resolved(&self) {}
}

// ============================================================================
// SECTION: Context Updater
// ============================================================================

/// Session-scoped access to the current context.
pub struct ContextUpdater<C> {
    /// Current context cell.
    cell: Arc<ContextCell<C>>,
    /// Commits context edits and re-renders.
    publisher: ContextPublisher<C>,
    /// Re-renders the current context.
    refresher: RenderTrigger,
}

impl<C> Clone for ContextUpdater<C> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            publisher: Arc::clone(&self.publisher),
            refresher: Arc::clone(&self.refresher),
        }
    }
}

impl<C: PermissionContext> ContextUpdater<C> {
    /// Returns the latest committed context.
    #[must_use]
    pub fn current(&self) -> C {
        self.cell.get()
    }

    /// Returns a reader for the latest committed context.
    #[must_use]
    pub fn reader(&self) -> ContextReader<C> {
        let cell = Arc::clone(&self.cell);
        Arc::new(move || cell.get())
    }

    /// Returns the publisher used by edit handlers.
    #[must_use]
    pub fn publisher(&self) -> ContextPublisher<C> {
        Arc::clone(&self.publisher)
    }

    /// Returns a trigger that re-renders the current context.
    #[must_use]
    pub fn refresher(&self) -> RenderTrigger {
        Arc::clone(&self.refresher)
    }

    /// Replaces the context and runs the full render pipeline.
    pub async fn update(&self, context: C) {
        (self.publisher)(Box::new(move |_: &C| context)).await;
    }

    /// Applies `edit` to the latest context and runs the full render pipeline.
    pub async fn edit(&self, edit: impl FnOnce(&C) -> C + Send + 'static) {
        (self.publisher)(Box::new(edit)).await;
    }

    /// Re-renders the current context.
    pub async fn refresh(&self) {
        (self.refresher)().await;
    }
}

// ============================================================================
// SECTION: Render Pipeline
// ============================================================================

/// Audit labels carried through one pass.
#[derive(Debug, Clone)]
struct AuditScope {
    /// Request origin.
    origin: String,
    /// Permission type.
    permission_type: PermissionType,
    /// Chain, once resolved.
    chain_id: Option<ChainId>,
}

impl AuditScope {
    /// Builds an event carrying the scope labels.
    fn event(&self, stage: LifecycleStage, outcome: AuditOutcome) -> LifecycleAuditEvent {
        let event = LifecycleAuditEvent::new(stage, outcome)
            .origin(self.origin.clone())
            .permission_type(self.permission_type.clone());
        match self.chain_id {
            Some(chain_id) => event.chain_id(chain_id),
            None => event,
        }
    }
}

/// Full render pipeline for one session: metadata, content, surface update.
struct RenderPipeline<L: LifecycleHandlers> {
    /// Per-type handlers.
    handlers: Arc<L>,
    /// Confirmation session being rendered.
    session: ConfirmationSession,
    /// Current context.
    cell: Arc<ContextCell<L::Context>>,
    /// Serializes the generation check with the surface update.
    render_lock: tokio::sync::Mutex<()>,
    /// Request origin.
    origin: String,
    /// Resolved chain.
    chain_id: ChainId,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Audit labels.
    scope: AuditScope,
}

impl<L: LifecycleHandlers> RenderPipeline<L> {
    /// Renders the current context unless a newer one supersedes it.
    async fn render(&self) -> Result<(), LifecycleError> {
        let (generation, context) = self.cell.snapshot();
        let metadata = self.handlers.derive_metadata(&context).await?;
        let content = self
            .handlers
            .create_confirmation_content(ContentInput {
                context: &context,
                metadata: &metadata,
                origin: &self.origin,
                chain_id: self.chain_id,
            })
            .await?;
        let _guard = self.render_lock.lock().await;
        if self.cell.generation() != generation {
            return Ok(());
        }
        self.session.update_content(content, !metadata.is_valid()).await?;
        Ok(())
    }

    /// Renders and records failures instead of propagating them.
    async fn render_logged(&self) {
        if let Err(err) = self.render().await {
            self.audit.record(
                &self
                    .scope
                    .event(LifecycleStage::Render, AuditOutcome::Ignored)
                    .message(err.to_string()),
            );
        }
    }

    /// Builds the updater handed to the confirmation-created hook.
    fn updater(self: &Arc<Self>) -> ContextUpdater<L::Context> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let publish_weak = weak.clone();
        let publisher: ContextPublisher<L::Context> =
            Arc::new(move |edit: ContextEdit<L::Context>| -> HandlerFuture {
                // Commit now so edits land in call order, then render.
                let pipeline = publish_weak.upgrade();
                if let Some(pipeline) = &pipeline {
                    pipeline.cell.update(edit);
                }
                Box::pin(async move {
                    if let Some(pipeline) = pipeline {
                        pipeline.render_logged().await;
                    }
                })
            });
        let refresher: RenderTrigger = Arc::new(move || -> HandlerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pipeline) = weak.upgrade() {
                    pipeline.render_logged().await;
                }
            })
        });
        ContextUpdater {
            cell: Arc::clone(&self.cell),
            publisher,
            refresher,
        }
    }
}

/// Slot filled with the context cell once context building succeeds.
type ContextSlot<C> = Arc<OnceLock<Arc<ContextCell<C>>>>;

/// Builds the Grant predicate: the latest context must derive valid metadata.
fn grant_predicate<L: LifecycleHandlers>(
    handlers: &Arc<L>,
    slot: &ContextSlot<L::Context>,
) -> GrantPredicate {
    let handlers = Arc::clone(handlers);
    let slot = Arc::clone(slot);
    Arc::new(move || -> Pin<Box<dyn Future<Output = bool> + Send>> {
        let handlers = Arc::clone(&handlers);
        let context = slot.get().map(|cell| cell.get());
        Box::pin(async move {
            let Some(context) = context else {
                return false;
            };
            handlers.derive_metadata(&context).await.is_ok_and(|metadata| metadata.is_valid())
        })
    })
}

/// Placeholder content shown while the context is built.
fn skeleton_content() -> Component {
    Component::container(vec![Component::heading("Permission request"), Component::Spinner])
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Drives permission requests from validation to a signed response.
pub struct PermissionRequestLifecycleOrchestrator {
    /// External collaborators.
    services: OrchestratorServices,
    /// Settings.
    config: OrchestratorConfig,
    /// Decision timeout factory.
    timeouts: TimeoutFactory,
}

impl PermissionRequestLifecycleOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(services: OrchestratorServices, config: OrchestratorConfig) -> Self {
        let timeouts =
            TimeoutFactory::new(config.confirmation_timeout, Arc::clone(&services.audit));
        Self {
            services,
            config,
            timeouts,
        }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the external collaborators.
    #[must_use]
    pub const fn services(&self) -> &OrchestratorServices {
        &self.services
    }

    /// Runs one request through the full lifecycle.
    ///
    /// A denial is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for every abort path; any surface that was
    /// shown is closed first.
    pub async fn orchestrate<L: LifecycleHandlers>(
        &self,
        origin: &str,
        request: &PermissionRequest,
        handlers: Arc<L>,
    ) -> Result<PermissionResult, LifecycleError> {
        let mut scope = AuditScope {
            origin: origin.to_string(),
            permission_type: handlers.permission_type(),
            chain_id: None,
        };
        self.services
            .audit
            .record(&scope.event(LifecycleStage::RequestReceived, AuditOutcome::Ok));
        let result = self.run(&mut scope, origin, request, &handlers).await;
        handlers.on_confirmation_resolved().await;
        result
    }

    /// Lifecycle body; the caller runs the resolved hook afterwards.
    async fn run<L: LifecycleHandlers>(
        &self,
        scope: &mut AuditScope,
        origin: &str,
        request: &PermissionRequest,
        handlers: &Arc<L>,
    ) -> Result<PermissionResult, LifecycleError> {
        // Validating: nothing is shown yet, so failures propagate directly.
        let chain_id = ChainId::from_hex(&request.chain_id).map_err(|err| {
            let err = LifecycleError::Validation(err.to_string());
            self.failed(scope, LifecycleStage::Validation, err)
        })?;
        scope.chain_id = Some(chain_id);
        if !self.config.supported_chains.contains(&chain_id) {
            return Err(self.failed(
                scope,
                LifecycleStage::Validation,
                LifecycleError::UnsupportedChain(chain_id),
            ));
        }
        let accounts = self
            .services
            .accounts
            .account_addresses()
            .await
            .map_err(|err| self.failed(scope, LifecycleStage::Validation, err.into()))?;
        let validated = handlers
            .validate_request(request)
            .await
            .map_err(|err| self.failed(scope, LifecycleStage::Validation, err))?;
        self.services.audit.record(&scope.event(LifecycleStage::Validation, AuditOutcome::Ok));

        // Skeleton render.
        let slot: ContextSlot<L::Context> = Arc::default();
        let session = ConfirmationSession::new(ConfirmationSessionParams {
            host: Arc::clone(&self.services.host),
            dispatcher: Arc::clone(&self.services.dispatcher),
            timeouts: self.timeouts.clone(),
            content: skeleton_content(),
            is_grant_disabled: true,
            on_before_grant: Some(grant_predicate(handlers, &slot)),
        });
        let initialized = session.initialize().await.map_err(LifecycleError::from);
        let interface_id =
            self.close_on_error(&session, scope, LifecycleStage::Render, initialized).await?;

        // BuildingContext.
        let built = handlers
            .build_context(ContextBuildInput {
                request: &validated,
                chain_id,
                accounts: &accounts,
                origin,
            })
            .await;
        let context =
            self.close_on_error(&session, scope, LifecycleStage::ContextBuild, built).await?;
        self.services.audit.record(&scope.event(LifecycleStage::ContextBuild, AuditOutcome::Ok));
        let cell = Arc::new(ContextCell::new(context));
        let _ = slot.set(Arc::clone(&cell));
        let pipeline = Arc::new(RenderPipeline {
            handlers: Arc::clone(handlers),
            session: session.clone(),
            cell: Arc::clone(&cell),
            render_lock: tokio::sync::Mutex::new(()),
            origin: origin.to_string(),
            chain_id,
            audit: Arc::clone(&self.services.audit),
            scope: scope.clone(),
        });

        // First real render, then bindings.
        let rendered = pipeline.render().await;
        self.close_on_error(&session, scope, LifecycleStage::Render, rendered).await?;
        let created = handlers
            .on_confirmation_created(ConfirmationCreated {
                interface_id,
                dispatcher: Arc::clone(&self.services.dispatcher),
                updater: pipeline.updater(),
                audit: Arc::clone(&self.services.audit),
            })
            .await;
        self.close_on_error(&session, scope, LifecycleStage::Render, created).await?;

        // AwaitingDecision.
        let pending = session.display_and_await_decision().map_err(LifecycleError::from);
        let pending =
            self.close_on_error(&session, scope, LifecycleStage::Decision, pending).await?;
        let decision = pending.wait().await.map_err(LifecycleError::from);
        let decision =
            self.close_on_error(&session, scope, LifecycleStage::Decision, decision).await?;
        let audit = &self.services.audit;
        if !decision.granted {
            audit.record(&scope.event(LifecycleStage::Decision, AuditOutcome::Denied));
            return Ok(PermissionResult::denied());
        }
        audit.record(&scope.event(LifecycleStage::Decision, AuditOutcome::Granted));

        // In-flight edits must land before the final context is read.
        self.services.dispatcher.wait_for_pending_handlers().await;
        let context = cell.get();
        let finalized =
            self.finalize(scope, origin, chain_id, &validated, &context, handlers.as_ref()).await;
        let response =
            self.close_on_error(&session, scope, LifecycleStage::Finalization, finalized).await?;
        audit.record(&scope.event(LifecycleStage::Finalization, AuditOutcome::Ok));
        Ok(PermissionResult::Approved {
            response: Box::new(response),
        })
    }

    /// Finalization protocol: upgrade, apply, populate, caveats, sign.
    async fn finalize<L: LifecycleHandlers>(
        &self,
        scope: &AuditScope,
        origin: &str,
        chain_id: ChainId,
        validated: &PermissionRequest,
        context: &L::Context,
        handlers: &L,
    ) -> Result<PermissionResponse, LifecycleError> {
        let address = context.account_address().clone();
        self.upgrade_account(scope, chain_id, &address).await;

        let resolved = handlers.apply_context(context, validated).await?;
        let permission = handlers.populate_permission(&resolved.permission).await?;
        let environment = &self.config.environment;
        let mut caveats =
            handlers.create_permission_caveats(&permission, chain_id, environment).await?;

        let expiry = resolved.expiry().ok_or(LifecycleError::MissingExpiry)?;
        caveats.push(Caveat::timestamp(environment.timestamp_enforcer.clone(), expiry));
        let nonce = self.services.nonces.nonce(chain_id, &address).await?;
        caveats.push(Caveat::nonce(environment.nonce_enforcer.clone(), nonce));

        let delegation = Delegation {
            delegate: resolved.signer.data.address.clone(),
            delegator: address.clone(),
            authority: ROOT_AUTHORITY.to_string(),
            caveats,
            salt: generate_salt(),
        };
        let signature = self
            .services
            .signer
            .sign_delegation(SignDelegationRequest {
                chain_id,
                delegation: &delegation,
                address: &address,
                origin,
                justification: context.justification(),
            })
            .await?;
        let context = SignedDelegation {
            delegation,
            signature,
        }
        .encode()?;

        Ok(PermissionResponse {
            chain_id: chain_id.to_hex(),
            address,
            signer: resolved.signer.clone(),
            permission,
            rules: resolved.rules.clone(),
            context,
            signer_meta: SignerMeta {
                delegation_manager: environment.delegation_manager.clone(),
            },
        })
    }

    /// Runs the optimistic account upgrade; failures are recorded and ignored.
    async fn upgrade_account(&self, scope: &AuditScope, chain_id: ChainId, address: &Address) {
        let accounts = &self.services.accounts;
        let outcome = match accounts.requires_upgrade(chain_id, address).await {
            Ok(true) => accounts.upgrade_account(chain_id, address).await.map(|()| true),
            Ok(false) => Ok(false),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(true) => self
                .services
                .audit
                .record(&scope.event(LifecycleStage::AccountUpgrade, AuditOutcome::Ok)),
            Ok(false) => {}
            Err(err) => self.services.audit.record(
                &scope
                    .event(LifecycleStage::AccountUpgrade, AuditOutcome::Ignored)
                    .message(err.to_string()),
            ),
        }
    }

    /// Closes the surface with the error before propagating it.
    async fn close_on_error<T>(
        &self,
        session: &ConfirmationSession,
        scope: &AuditScope,
        stage: LifecycleStage,
        result: Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                session.close_with_error(err.to_string()).await;
                Err(self.failed(scope, stage, err))
            }
        }
    }

    /// Records a fatal stage failure and returns the error.
    fn failed(
        &self,
        scope: &AuditScope,
        stage: LifecycleStage,
        err: LifecycleError,
    ) -> LifecycleError {
        self.services
            .audit
            .record(&scope.event(stage, AuditOutcome::Error).message(err.to_string()));
        err
    }
}
