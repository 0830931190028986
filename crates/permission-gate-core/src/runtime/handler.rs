// crates/permission-gate-core/src/runtime/handler.rs
// ============================================================================
// Module: Permission Handlers
// Description: Per-type request handlers and the type-keyed handler factory.
// Purpose: Adapt permission definitions to the lifecycle orchestrator.
// Dependencies: async-trait, crate::{core, runtime}
// ============================================================================

//! ## Overview
//! A [`PermissionHandler`] adapts one [`PermissionDefinition`] to the
//! orchestrator: it composes the definition's content with rendered rules and
//! the add-rule modal, binds rule handlers once the surface exists, and
//! releases every binding when the session resolves. Each handler drives at
//! most one request. [`PermissionHandlerFactory`] selects the definition by
//! permission type once, when the handler is built.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::Caveat;
use crate::core::ChainId;
use crate::core::Component;
use crate::core::DelegationEnvironment;
use crate::core::Permission;
use crate::core::PermissionRequest;
use crate::core::PermissionResult;
use crate::core::PermissionType;
use crate::interfaces::EventDispatcher;
use crate::interfaces::HandlerRegistration;
use crate::runtime::definition::ContentInput;
use crate::runtime::definition::ContextBuildInput;
use crate::runtime::definition::DefinitionBindings;
use crate::runtime::definition::PermissionDefinition;
use crate::runtime::introduction::PermissionIntroductionService;
use crate::runtime::orchestrator::ConfirmationCreated;
use crate::runtime::orchestrator::LifecycleError;
use crate::runtime::orchestrator::LifecycleHandlers;
use crate::runtime::orchestrator::PermissionRequestLifecycleOrchestrator;
use crate::runtime::rule_modal::MetadataDeriver;
use crate::runtime::rule_modal::MetadataFuture;
use crate::runtime::rule_modal::RuleModalManager;
use crate::runtime::rule_modal::RuleModalParams;
use crate::runtime::rules::RuleBindings;
use crate::runtime::rules::RuleDescriptor;
use crate::runtime::rules::bind_rule_handlers;
use crate::runtime::rules::render_rules;

// ============================================================================
// SECTION: Handler Trait
// ============================================================================

/// Object-safe handler for one permission request.
#[async_trait]
pub trait PermissionRequestHandler: Send + Sync {
    /// Permission type handled.
    fn permission_type(&self) -> PermissionType;

    /// Drives the request to a grant or denial.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyHandled`] on a second call and any
    /// lifecycle error raised by the pass.
    async fn handle_permission_request(
        &self,
        origin: &str,
        request: &PermissionRequest,
    ) -> Result<PermissionResult, LifecycleError>;
}

// ============================================================================
// SECTION: Lifecycle Adapter
// ============================================================================

/// Bindings held for the live session.
struct SessionBindings<C, M> {
    /// Rule edit handlers.
    rules: RuleBindings,
    /// Add-rule modal.
    modal: RuleModalManager<C, M>,
    /// Definition-specific registrations.
    extra: Vec<HandlerRegistration>,
    /// Dispatcher the extra registrations live on.
    dispatcher: Arc<dyn EventDispatcher>,
}

/// Adapts a definition to [`LifecycleHandlers`].
struct DefinitionLifecycle<D: PermissionDefinition> {
    /// Permission definition.
    definition: Arc<D>,
    /// Every rule, rendered in order.
    rules: Vec<Arc<RuleDescriptor<D::Context, D::Metadata>>>,
    /// Bindings for the live session, if any.
    bindings: Mutex<Option<SessionBindings<D::Context, D::Metadata>>>,
}

impl<D: PermissionDefinition> DefinitionLifecycle<D> {
    /// Returns the live modal, if bound.
    fn modal(&self) -> Option<RuleModalManager<D::Context, D::Metadata>> {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bindings| bindings.modal.clone())
    }

    /// Metadata deriver shared with the modal.
    fn deriver(&self) -> MetadataDeriver<D::Context, D::Metadata> {
        let definition = Arc::clone(&self.definition);
        Arc::new(move |context: D::Context| -> MetadataFuture<D::Metadata> {
            let definition = Arc::clone(&definition);
            Box::pin(async move { definition.derive_metadata(&context).await })
        })
    }
}

#[async_trait]
impl<D: PermissionDefinition> LifecycleHandlers for DefinitionLifecycle<D> {
    type Context = D::Context;
    type Metadata = D::Metadata;

    fn permission_type(&self) -> PermissionType {
        self.definition.permission_type()
    }

    async fn validate_request(
        &self,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, LifecycleError> {
        Ok(self.definition.validate_request(request).await?)
    }

    async fn build_context(
        &self,
        input: ContextBuildInput<'_>,
    ) -> Result<Self::Context, LifecycleError> {
        Ok(self.definition.build_context(input).await?)
    }

    async fn derive_metadata(
        &self,
        context: &Self::Context,
    ) -> Result<Self::Metadata, LifecycleError> {
        Ok(self.definition.derive_metadata(context).await?)
    }

    async fn create_confirmation_content(
        &self,
        input: ContentInput<'_, Self::Context, Self::Metadata>,
    ) -> Result<Component, LifecycleError> {
        let mut children = vec![self.definition.create_confirmation_content(input)?];
        children.extend(render_rules(&self.rules, input.context, input.metadata)?);
        if let Some(modal) = self.modal()
            && let Some(affordance) = modal.render_modal(input.context, input.metadata).await?
        {
            children.push(affordance);
        }
        Ok(Component::container(children))
    }

    async fn apply_context(
        &self,
        context: &Self::Context,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, LifecycleError> {
        Ok(self.definition.apply_context(context, request).await?)
    }

    async fn populate_permission(
        &self,
        permission: &Permission,
    ) -> Result<Permission, LifecycleError> {
        Ok(self.definition.populate_permission(permission).await?)
    }

    async fn create_permission_caveats(
        &self,
        permission: &Permission,
        chain_id: ChainId,
        environment: &DelegationEnvironment,
    ) -> Result<Vec<Caveat>, LifecycleError> {
        Ok(self.definition.create_permission_caveats(permission, chain_id, environment).await?)
    }

    async fn on_confirmation_created(
        &self,
        created: ConfirmationCreated<Self::Context>,
    ) -> Result<(), LifecycleError> {
        let reader = created.updater.reader();
        let publisher = created.updater.publisher();
        let rules =
            bind_rule_handlers(&self.rules, &created.dispatcher, &created.interface_id, &publisher);
        let modal = RuleModalManager::new(RuleModalParams {
            rules: self.rules.iter().filter(|rule| rule.is_optional).cloned().collect(),
            dispatcher: Arc::clone(&created.dispatcher),
            interface_id: created.interface_id.clone(),
            get_context: Arc::clone(&reader),
            derive_metadata: self.deriver(),
            on_context_changed: Arc::clone(&publisher),
            on_modal_changed: created.updater.refresher(),
            audit: Arc::clone(&created.audit),
        });
        modal.bind_handlers();
        let extra = self.definition.bind_handlers(DefinitionBindings {
            interface_id: created.interface_id.clone(),
            dispatcher: Arc::clone(&created.dispatcher),
            get_context: reader,
            on_context_changed: publisher,
        });
        *self.bindings.lock().unwrap_or_else(PoisonError::into_inner) = Some(SessionBindings {
            rules,
            modal,
            extra,
            dispatcher: created.dispatcher,
        });
        // The modal affordance only renders once the modal exists.
        created.updater.refresh().await;
        Ok(())
    }

    async fn on_confirmation_resolved(&self) {
        let bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut bindings) = bindings {
            bindings.rules.unbind();
            bindings.modal.unbind_handlers();
            for registration in &bindings.extra {
                bindings.dispatcher.off(registration);
            }
        }
    }
}

// ============================================================================
// SECTION: Permission Handler
// ============================================================================

/// Single-use handler for one permission type.
pub struct PermissionHandler<D: PermissionDefinition> {
    /// Lifecycle adapter.
    lifecycle: Arc<DefinitionLifecycle<D>>,
    /// Orchestrator driving the pass.
    orchestrator: Arc<PermissionRequestLifecycleOrchestrator>,
    /// Optional first-use introduction.
    introduction: Option<Arc<PermissionIntroductionService>>,
    /// Set once a request was accepted.
    handled: AtomicBool,
}

impl<D: PermissionDefinition> PermissionHandler<D> {
    /// Creates a handler for `definition`.
    #[must_use]
    pub fn new(
        definition: D,
        orchestrator: Arc<PermissionRequestLifecycleOrchestrator>,
        introduction: Option<Arc<PermissionIntroductionService>>,
    ) -> Self {
        let rules = definition.rules();
        Self {
            lifecycle: Arc::new(DefinitionLifecycle {
                definition: Arc::new(definition),
                rules,
                bindings: Mutex::new(None),
            }),
            orchestrator,
            introduction,
            handled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<D: PermissionDefinition> PermissionRequestHandler for PermissionHandler<D> {
    fn permission_type(&self) -> PermissionType {
        self.lifecycle.definition.permission_type()
    }

    async fn handle_permission_request(
        &self,
        origin: &str,
        request: &PermissionRequest,
    ) -> Result<PermissionResult, LifecycleError> {
        if self.handled.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyHandled);
        }
        let permission_type = self.permission_type();
        if request.permission.permission_type != permission_type {
            return Err(LifecycleError::Validation(format!(
                "handler for `{permission_type}` received `{}`",
                request.permission.permission_type
            )));
        }
        if let Some(introduction) = &self.introduction
            && let Some(outcome) = introduction.show_if_needed(&permission_type).await?
            && outcome.was_cancelled
        {
            return Ok(PermissionResult::denied());
        }
        self.orchestrator.orchestrate(origin, request, Arc::clone(&self.lifecycle)).await
    }
}

// ============================================================================
// SECTION: Handler Factory
// ============================================================================

/// Builds a boxed handler for one request.
type HandlerBuilder = Arc<
    dyn Fn(
            Arc<PermissionRequestLifecycleOrchestrator>,
            Option<Arc<PermissionIntroductionService>>,
        ) -> Box<dyn PermissionRequestHandler>
        + Send
        + Sync,
>;

/// Type-keyed dispatch table of permission definitions.
pub struct PermissionHandlerFactory {
    /// Orchestrator shared by every handler.
    orchestrator: Arc<PermissionRequestLifecycleOrchestrator>,
    /// Optional introduction service.
    introduction: Option<Arc<PermissionIntroductionService>>,
    /// Builders by permission type.
    builders: BTreeMap<PermissionType, HandlerBuilder>,
}

impl PermissionHandlerFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new(orchestrator: Arc<PermissionRequestLifecycleOrchestrator>) -> Self {
        Self {
            orchestrator,
            introduction: None,
            builders: BTreeMap::new(),
        }
    }

    /// Shows first-use introductions before each type's first request.
    #[must_use]
    pub fn with_introduction(mut self, introduction: Arc<PermissionIntroductionService>) -> Self {
        self.introduction = Some(introduction);
        self
    }

    /// Registers a definition constructor under its permission type.
    ///
    /// A later registration for the same type replaces the earlier one.
    #[must_use]
    pub fn register<D, F>(mut self, make_definition: F) -> Self
    where
        D: PermissionDefinition,
        F: Fn() -> D + Send + Sync + 'static,
    {
        let permission_type = make_definition().permission_type();
        let builder: HandlerBuilder = Arc::new(
            move |orchestrator: Arc<PermissionRequestLifecycleOrchestrator>,
                  introduction: Option<Arc<PermissionIntroductionService>>|
                  -> Box<dyn PermissionRequestHandler> {
                Box::new(PermissionHandler::new(make_definition(), orchestrator, introduction))
            },
        );
        self.builders.insert(permission_type, builder);
        self
    }

    /// Returns the registered permission types.
    #[must_use]
    pub fn supported_types(&self) -> Vec<PermissionType> {
        self.builders.keys().cloned().collect()
    }

    /// Builds a fresh handler for the request's permission type.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for unregistered types.
    pub fn create_handler(
        &self,
        request: &PermissionRequest,
    ) -> Result<Box<dyn PermissionRequestHandler>, LifecycleError> {
        let permission_type = &request.permission.permission_type;
        let builder = self.builders.get(permission_type).ok_or_else(|| {
            LifecycleError::Validation(format!("unsupported permission type `{permission_type}`"))
        })?;
        Ok(builder(Arc::clone(&self.orchestrator), self.introduction.clone()))
    }
}
