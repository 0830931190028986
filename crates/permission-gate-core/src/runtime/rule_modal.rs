// crates/permission-gate-core/src/runtime/rule_modal.rs
// ============================================================================
// Module: Add-Rule Modal
// Description: In-dialog modal for adding unset optional rules.
// Purpose: Let the user pick an unset rule, enter a value, and commit it.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The [`RuleModalManager`] owns a small edit buffer (visibility, selected
//! rule, pending value) that lives only while the modal is open. Committing
//! folds the pending value into a new context through the selected rule's
//! updater and publishes it like any other edit.
//! Invariants:
//! - Only rules whose value is unset are offered.
//! - Saving an empty pending value is a silent no-op.
//! - `unbind_handlers` releases every registration and clears the registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use serde_json::Value;

use crate::core::ButtonVariant;
use crate::core::Component;
use crate::core::Field;
use crate::core::FieldKind;
use crate::core::InterfaceId;
use crate::interfaces::EventBinding;
use crate::interfaces::EventDispatcher;
use crate::interfaces::EventHandler;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HandlerRegistration;
use crate::interfaces::UserEventKind;
use crate::interfaces::UserInputEvent;
use crate::runtime::audit::AuditOutcome;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::LifecycleAuditEvent;
use crate::runtime::audit::LifecycleStage;
use crate::runtime::definition::ContextPublisher;
use crate::runtime::definition::ContextReader;
use crate::runtime::definition::DefinitionError;
use crate::runtime::definition::PermissionContext;
use crate::runtime::definition::PermissionMetadata;
use crate::runtime::definition::RenderTrigger;
use crate::runtime::rules::RuleDescriptor;
use crate::runtime::rules::RuleError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Element name of the button that opens and closes the modal.
pub const ADD_RULE_TOGGLE: &str = "add-more-rules";

/// Element name of the rule selector.
pub const RULE_SELECT: &str = "select-rule";

/// Element name of the pending value input.
pub const RULE_VALUE_INPUT: &str = "rule-value";

/// Element name of the save button.
pub const SAVE_RULE_BUTTON: &str = "save-rule";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Boxed metadata derivation.
pub type MetadataFuture<M> = Pin<Box<dyn Future<Output = Result<M, DefinitionError>> + Send>>;

/// Derives metadata for a (possibly hypothetical) context.
pub type MetadataDeriver<C, M> = Arc<dyn Fn(C) -> MetadataFuture<M> + Send + Sync>;

/// Transient modal edit buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ModalBuffer {
    /// Whether the modal is open.
    visible: bool,
    /// Index into the currently addable rules.
    selected_index: usize,
    /// Value typed so far.
    pending_value: String,
}

/// Dependencies for a [`RuleModalManager`].
pub struct RuleModalParams<C, M> {
    /// Candidate rules (usually the definition's optional rules).
    pub rules: Vec<Arc<RuleDescriptor<C, M>>>,
    /// Event dispatcher.
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Surface the modal is rendered into.
    pub interface_id: InterfaceId,
    /// Reads the latest committed context.
    pub get_context: ContextReader<C>,
    /// Derives metadata for validity checks.
    pub derive_metadata: MetadataDeriver<C, M>,
    /// Commits context edits.
    pub on_context_changed: ContextPublisher<C>,
    /// Re-renders after buffer changes.
    pub on_modal_changed: RenderTrigger,
    /// Receives failed saves triggered from the surface.
    pub audit: Arc<dyn AuditSink>,
}

/// Shared manager internals.
struct ModalInner<C, M> {
    /// Dependencies.
    params: RuleModalParams<C, M>,
    /// Edit buffer.
    buffer: Mutex<ModalBuffer>,
    /// Live handler registrations.
    registrations: Mutex<Vec<HandlerRegistration>>,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Modal for adding unset optional rules.
pub struct RuleModalManager<C, M> {
    /// Shared internals.
    inner: Arc<ModalInner<C, M>>,
}

impl<C, M> Clone for RuleModalManager<C, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, M> RuleModalManager<C, M>
where
    C: PermissionContext,
    M: PermissionMetadata,
{
    /// Creates a closed modal with no handlers bound.
    #[must_use]
    pub fn new(params: RuleModalParams<C, M>) -> Self {
        Self {
            inner: Arc::new(ModalInner {
                params,
                buffer: Mutex::new(ModalBuffer::default()),
                registrations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns true when at least one candidate rule is unset.
    #[must_use]
    pub fn has_rules_to_add(&self, context: &C, metadata: &M) -> bool {
        !self.inner.addable(context, metadata).is_empty()
    }

    /// Returns true while the modal is open.
    #[must_use]
    pub fn is_modal_visible(&self) -> bool {
        self.inner.buffer().visible
    }

    /// Number of live handler registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Renders the add-rule affordance, or `None` when nothing can be added.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Configuration`] when the selected rule is misconfigured.
    pub async fn render_modal(
        &self,
        context: &C,
        metadata: &M,
    ) -> Result<Option<Component>, RuleError> {
        let addable = self.inner.addable(context, metadata);
        if addable.is_empty() {
            return Ok(None);
        }
        let buffer = self.inner.buffer().clone();
        if !buffer.visible {
            return Ok(Some(Component::button(
                ADD_RULE_TOGGLE,
                "Add more rules",
                false,
                ButtonVariant::Secondary,
            )));
        }

        let Some(selected) = addable.get(buffer.selected_index).or_else(|| addable.first())
        else {
            return Ok(None);
        };
        let kind = selected.field_kind()?;
        let save_disabled =
            !self.inner.is_pending_valid(selected, context, &buffer.pending_value).await;
        let pending_value =
            (!buffer.pending_value.is_empty()).then(|| buffer.pending_value.clone());

        Ok(Some(Component::section(vec![
            Component::heading("Add rule"),
            Component::Field(Field {
                name: RULE_SELECT.to_string(),
                label: "Rule".to_string(),
                kind: FieldKind::Dropdown {
                    options: addable.iter().map(|rule| rule.name.clone()).collect(),
                },
                value: Some(selected.name.clone()),
                disabled: false,
                error: None,
                tooltip: None,
            }),
            Component::Field(Field {
                name: RULE_VALUE_INPUT.to_string(),
                label: selected.label.clone(),
                kind,
                value: pending_value,
                disabled: false,
                error: None,
                tooltip: selected.tooltip.clone(),
            }),
            Component::button(ADD_RULE_TOGGLE, "Close", false, ButtonVariant::Secondary),
            Component::button(SAVE_RULE_BUTTON, "Save", save_disabled, ButtonVariant::Primary),
        ])))
    }

    /// Opens or closes the modal. Closing discards the buffer.
    pub async fn toggle(&self) {
        {
            let mut buffer = self.inner.buffer();
            let visible = !buffer.visible;
            *buffer = ModalBuffer {
                visible,
                ..ModalBuffer::default()
            };
        }
        (self.inner.params.on_modal_changed)().await;
    }

    /// Selects the addable rule named `name` and clears the pending value.
    ///
    /// Unknown names leave the selection out of range so a later save fails.
    pub async fn select(&self, name: &str) {
        let context = (self.inner.params.get_context)();
        let metadata = (self.inner.params.derive_metadata)(context.clone()).await;
        let index = metadata.ok().and_then(|metadata| {
            self.inner.addable(&context, &metadata).iter().position(|rule| rule.name == name)
        });
        {
            let mut buffer = self.inner.buffer();
            buffer.selected_index = index.unwrap_or(usize::MAX);
            buffer.pending_value.clear();
        }
        (self.inner.params.on_modal_changed)().await;
    }

    /// Replaces the pending value.
    pub async fn set_pending_value(&self, value: impl Into<String>) {
        self.inner.buffer().pending_value = value.into();
        (self.inner.params.on_modal_changed)().await;
    }

    /// Commits the pending value into the selected rule.
    ///
    /// Returns `Ok(false)` when the pending value is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::NotFound`] when the selection does not match an
    /// addable rule and [`RuleError::Metadata`] when metadata cannot be derived.
    pub async fn save(&self) -> Result<bool, RuleError> {
        let ModalBuffer {
            selected_index,
            pending_value,
            ..
        } = self.inner.buffer().clone();
        if pending_value.is_empty() {
            return Ok(false);
        }
        let context = (self.inner.params.get_context)();
        let metadata = (self.inner.params.derive_metadata)(context.clone())
            .await
            .map_err(|err| RuleError::Metadata(err.to_string()))?;
        let addable = self.inner.addable(&context, &metadata);
        let Some(rule) = addable.into_iter().nth(selected_index) else {
            return Err(RuleError::NotFound(format!("no addable rule at index {selected_index}")));
        };
        *self.inner.buffer() = ModalBuffer::default();
        (self.inner.params.on_context_changed)(Box::new(move |current: &C| {
            rule.update_context(current, Some(pending_value))
        }))
        .await;
        Ok(true)
    }

    /// Binds the toggle, select, value, and save handlers.
    pub fn bind_handlers(&self) {
        let interface_id = &self.inner.params.interface_id;
        let dispatcher = &self.inner.params.dispatcher;
        let routes = [
            (ADD_RULE_TOGGLE, UserEventKind::ButtonClick, ModalRoute::Toggle),
            (RULE_SELECT, UserEventKind::InputChange, ModalRoute::Select),
            (RULE_VALUE_INPUT, UserEventKind::InputChange, ModalRoute::Value),
            (SAVE_RULE_BUTTON, UserEventKind::ButtonClick, ModalRoute::Save),
        ];
        let bound: Vec<HandlerRegistration> = routes
            .into_iter()
            .map(|(element, kind, route)| {
                dispatcher.on(
                    EventBinding::new(element, kind, interface_id.clone()),
                    self.route_handler(route),
                )
            })
            .collect();
        self.inner.registrations.lock().unwrap_or_else(PoisonError::into_inner).extend(bound);
    }

    /// Unbinds every handler and clears the registry.
    pub fn unbind_handlers(&self) {
        let registrations = std::mem::take(
            &mut *self.inner.registrations.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for registration in &registrations {
            self.inner.params.dispatcher.off(registration);
        }
    }

    /// Builds a handler for one route holding only a weak reference.
    fn route_handler(&self, route: ModalRoute) -> EventHandler {
        let weak: Weak<ModalInner<C, M>> = Arc::downgrade(&self.inner);
        Arc::new(move |event: UserInputEvent| -> HandlerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let manager = Self { inner };
                match route {
                    ModalRoute::Toggle => manager.toggle().await,
                    ModalRoute::Select => {
                        let name = event.value_as_string().unwrap_or_default();
                        manager.select(&name).await;
                    }
                    ModalRoute::Value => {
                        let value = match event.value {
                            Some(Value::Null) | None => String::new(),
                            _ => event.value_as_string().unwrap_or_default(),
                        };
                        manager.set_pending_value(value).await;
                    }
                    ModalRoute::Save => {
                        // A stale selection leaves the modal open for another try.
                        if let Err(err) = manager.save().await {
                            manager.inner.params.audit.record(
                                &LifecycleAuditEvent::new(
                                    LifecycleStage::Render,
                                    AuditOutcome::Ignored,
                                )
                                .message(format!("rule modal save failed: {err}")),
                            );
                        }
                    }
                }
            })
        })
    }
}

/// Modal event routes.
#[derive(Debug, Clone, Copy)]
enum ModalRoute {
    /// Open or close.
    Toggle,
    /// Rule selection changed.
    Select,
    /// Pending value changed.
    Value,
    /// Commit.
    Save,
}

impl<C, M> ModalInner<C, M>
where
    C: PermissionContext,
    M: PermissionMetadata,
{
    /// Locks the edit buffer.
    fn buffer(&self) -> MutexGuard<'_, ModalBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Candidate rules that are currently unset.
    fn addable(&self, context: &C, metadata: &M) -> Vec<Arc<RuleDescriptor<C, M>>> {
        self.params
            .rules
            .iter()
            .filter(|rule| rule.read(context, metadata).value.is_none())
            .cloned()
            .collect()
    }

    /// Validates the pending value against a hypothetical context.
    async fn is_pending_valid(
        &self,
        rule: &RuleDescriptor<C, M>,
        context: &C,
        pending_value: &str,
    ) -> bool {
        if pending_value.is_empty() {
            return false;
        }
        let hypothetical = rule.update_context(context, Some(pending_value.to_string()));
        match (self.params.derive_metadata)(hypothetical).await {
            Ok(metadata) => !metadata.validation_errors().contains_key(&rule.name),
            Err(_) => false,
        }
    }
}
