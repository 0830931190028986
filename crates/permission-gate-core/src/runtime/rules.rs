// crates/permission-gate-core/src/runtime/rules.rs
// ============================================================================
// Module: Rule Rendering and Binding
// Description: Declarative rule descriptors rendered as form fields.
// Purpose: Turn per-type rule descriptors into fields and edit handlers.
// Dependencies: thiserror, crate::{core, interfaces, runtime::definition}
// ============================================================================

//! ## Overview
//! A [`RuleDescriptor`] names one adjustable term of a permission and knows how
//! to read its value out of a context and how to fold a new value back in.
//! [`render_rule`] turns a descriptor into a field, a read-only row, or nothing;
//! [`bind_rule_handlers`] routes edits on those fields into fresh contexts.
//! Invariants:
//! - Edits never mutate a context; `update_context` always returns a new one.
//! - When a context disallows adjustment, every rule renders read-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

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
use crate::runtime::definition::ContextPublisher;
use crate::runtime::definition::PermissionContext;
use crate::runtime::definition::PermissionMetadata;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Suffix appended to a rule name to form its remove-button element name.
pub const REMOVE_BUTTON_SUFFIX: &str = "_removeButton";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Rule rendering and editing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A rule descriptor is inconsistent.
    #[error("rule misconfigured: {0}")]
    Configuration(String),
    /// A referenced rule does not exist.
    #[error("rule not found: {0}")]
    NotFound(String),
    /// Metadata for the edited context could not be derived.
    #[error("rule metadata unavailable: {0}")]
    Metadata(String),
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Field type used to render a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFieldType {
    /// Free-form text.
    Text,
    /// Numeric input.
    Number,
    /// Fixed option list.
    Dropdown,
    /// Date and time picker.
    DateTime,
}

impl FromStr for RuleFieldType {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "dropdown" => Ok(Self::Dropdown),
            "datetime" => Ok(Self::DateTime),
            other => Err(RuleError::Configuration(format!("unrecognized field type `{other}`"))),
        }
    }
}

/// Value and display state read for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleData {
    /// Current value; `None` means the rule is not set.
    pub value: Option<String>,
    /// Whether the rule is shown at all.
    pub is_visible: bool,
    /// Whether this rule may be edited when adjustment is allowed.
    pub is_editable: bool,
}

impl RuleData {
    /// Visible, editable data holding `value`.
    #[must_use]
    pub const fn editable(value: Option<String>) -> Self {
        Self {
            value,
            is_visible: true,
            is_editable: true,
        }
    }
}

/// Reads a rule's data from a context and its metadata.
pub type RuleReader<C, M> = Arc<dyn Fn(&C, &M) -> RuleData + Send + Sync>;

/// Returns a new context with the rule set to a value (or removed on `None`).
pub type RuleUpdater<C> = Arc<dyn Fn(&C, Option<String>) -> C + Send + Sync>;

/// Declarative description of one adjustable permission term.
pub struct RuleDescriptor<C, M> {
    /// Element name of the rendered field.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Field type.
    pub field_type: RuleFieldType,
    /// Whether the user may remove the rule entirely.
    pub is_optional: bool,
    /// Optional tooltip.
    pub tooltip: Option<String>,
    /// Options for dropdown rules.
    pub options: Option<Vec<String>>,
    /// Value reader.
    read: RuleReader<C, M>,
    /// Context updater.
    update: RuleUpdater<C>,
}

impl<C, M> RuleDescriptor<C, M> {
    /// Creates a required rule.
    pub fn new<R, U>(
        name: impl Into<String>,
        label: impl Into<String>,
        field_type: RuleFieldType,
        read: R,
        update: U,
    ) -> Self
    where
        R: Fn(&C, &M) -> RuleData + Send + Sync + 'static,
        U: Fn(&C, Option<String>) -> C + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            is_optional: false,
            tooltip: None,
            options: None,
            read: Arc::new(read),
            update: Arc::new(update),
        }
    }

    /// Marks the rule as removable.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Attaches a tooltip.
    #[must_use]
    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Attaches dropdown options.
    #[must_use]
    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Reads the rule's data.
    pub fn read(&self, context: &C, metadata: &M) -> RuleData {
        (self.read)(context, metadata)
    }

    /// Returns a new context with the rule set to `value`.
    pub fn update_context(&self, context: &C, value: Option<String>) -> C {
        (self.update)(context, value)
    }

    /// Element name of the remove button for this rule.
    #[must_use]
    pub fn remove_button_name(&self) -> String {
        format!("{}{REMOVE_BUTTON_SUFFIX}", self.name)
    }

    /// Resolves the field kind, checking dropdown options.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Configuration`] for a dropdown without options.
    pub fn field_kind(&self) -> Result<FieldKind, RuleError> {
        match self.field_type {
            RuleFieldType::Text => Ok(FieldKind::Text),
            RuleFieldType::Number => Ok(FieldKind::Number),
            RuleFieldType::DateTime => Ok(FieldKind::DateTime),
            RuleFieldType::Dropdown => match &self.options {
                Some(options) if !options.is_empty() => Ok(FieldKind::Dropdown {
                    options: options.clone(),
                }),
                _ => Err(RuleError::Configuration(format!(
                    "dropdown rule `{}` has no options",
                    self.name
                ))),
            },
        }
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders one rule against the current context and metadata.
///
/// Returns `None` for hidden rules and for unset optional rules (those are
/// offered through the add-rule modal instead). An unset required rule renders
/// as a disabled placeholder field.
///
/// # Errors
///
/// Returns [`RuleError::Configuration`] when the descriptor is inconsistent.
pub fn render_rule<C, M>(
    rule: &RuleDescriptor<C, M>,
    context: &C,
    metadata: &M,
) -> Result<Option<Component>, RuleError>
where
    C: PermissionContext,
    M: PermissionMetadata,
{
    let kind = rule.field_kind()?;
    let data = rule.read(context, metadata);
    if !data.is_visible {
        return Ok(None);
    }
    let error = metadata.validation_errors().get(&rule.name).cloned();
    let Some(value) = data.value else {
        if rule.is_optional {
            return Ok(None);
        }
        return Ok(Some(Component::Field(Field {
            name: rule.name.clone(),
            label: rule.label.clone(),
            kind,
            value: None,
            disabled: true,
            error,
            tooltip: rule.tooltip.clone(),
        })));
    };

    if !context.is_adjustment_allowed() || !data.is_editable {
        return Ok(Some(Component::Row {
            label: rule.label.clone(),
            value,
            tooltip: rule.tooltip.clone(),
        }));
    }

    let field = Component::Field(Field {
        name: rule.name.clone(),
        label: rule.label.clone(),
        kind,
        value: Some(value),
        disabled: false,
        error,
        tooltip: rule.tooltip.clone(),
    });
    if !rule.is_optional {
        return Ok(Some(field));
    }
    Ok(Some(Component::section(vec![
        field,
        Component::button(rule.remove_button_name(), "Remove", false, ButtonVariant::Destructive),
    ])))
}

/// Renders every rule, dropping those that render nothing.
///
/// # Errors
///
/// Returns the first [`RuleError`] raised by [`render_rule`].
pub fn render_rules<C, M>(
    rules: &[Arc<RuleDescriptor<C, M>>],
    context: &C,
    metadata: &M,
) -> Result<Vec<Component>, RuleError>
where
    C: PermissionContext,
    M: PermissionMetadata,
{
    let mut rendered = Vec::with_capacity(rules.len());
    for rule in rules {
        if let Some(component) = render_rule(rule, context, metadata)? {
            rendered.push(component);
        }
    }
    Ok(rendered)
}

// ============================================================================
// SECTION: Binding
// ============================================================================

/// Registrations for rule edit handlers.
///
/// # Invariants
/// - `unbind` releases every registration exactly once.
pub struct RuleBindings {
    /// Dispatcher the handlers were bound on.
    dispatcher: Arc<dyn EventDispatcher>,
    /// Live registrations.
    registrations: Vec<HandlerRegistration>,
}

impl RuleBindings {
    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns true when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Unbinds every handler. Safe to call repeatedly.
    pub fn unbind(&mut self) {
        for registration in self.registrations.drain(..) {
            self.dispatcher.off(&registration);
        }
    }
}

/// Binds an input-change handler per rule and a remove handler per optional rule.
///
/// Each handler publishes an edit that runs the rule's updater against the
/// latest committed context, so back-to-back edits never overwrite each other.
pub fn bind_rule_handlers<C, M>(
    rules: &[Arc<RuleDescriptor<C, M>>],
    dispatcher: &Arc<dyn EventDispatcher>,
    interface_id: &InterfaceId,
    on_context_changed: &ContextPublisher<C>,
) -> RuleBindings
where
    C: PermissionContext,
    M: PermissionMetadata,
{
    let mut registrations = Vec::new();
    for rule in rules {
        let edit = edit_handler(Arc::clone(rule), on_context_changed, |event| {
            event.value_as_string()
        });
        registrations.push(dispatcher.on(
            EventBinding::new(&rule.name, UserEventKind::InputChange, interface_id.clone()),
            edit,
        ));
        if rule.is_optional {
            let remove = edit_handler(Arc::clone(rule), on_context_changed, |_| None);
            registrations.push(dispatcher.on(
                EventBinding::new(
                    rule.remove_button_name(),
                    UserEventKind::ButtonClick,
                    interface_id.clone(),
                ),
                remove,
            ));
        }
    }
    RuleBindings {
        dispatcher: Arc::clone(dispatcher),
        registrations,
    }
}

/// Builds a handler that applies `value_of(event)` through the rule's updater.
fn edit_handler<C, M, V>(
    rule: Arc<RuleDescriptor<C, M>>,
    on_context_changed: &ContextPublisher<C>,
    value_of: V,
) -> EventHandler
where
    C: PermissionContext,
    M: PermissionMetadata,
    V: Fn(&UserInputEvent) -> Option<String> + Send + Sync + 'static,
{
    let publish = Arc::clone(on_context_changed);
    Arc::new(move |event: UserInputEvent| -> HandlerFuture {
        let rule = Arc::clone(&rule);
        let value = value_of(&event);
        publish(Box::new(move |current: &C| rule.update_context(current, value)))
    })
}
