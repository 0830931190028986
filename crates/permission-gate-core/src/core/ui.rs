// crates/permission-gate-core/src/core/ui.rs
// ============================================================================
// Module: Confirmation UI Tree
// Description: Host-agnostic component tree rendered into dialog surfaces.
// Purpose: Describe confirmation content without binding to a host toolkit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The engine describes every surface as a [`Component`] tree. Hosts translate
//! the tree into their native widgets; interactive components carry a `name`
//! that the event dispatcher uses to route user input back to the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Field Kinds
// ============================================================================

/// Kind of an editable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form text input.
    Text,
    /// Numeric input.
    Number,
    /// Selection from a fixed option list.
    Dropdown {
        /// Selectable option values.
        options: Vec<String>,
    },
    /// Date and time picker.
    DateTime,
}

/// Visual weight of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonVariant {
    /// Primary call to action.
    Primary,
    /// Secondary action.
    Secondary,
    /// Destructive action.
    Destructive,
}

// ============================================================================
// SECTION: Components
// ============================================================================

/// Editable form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Element name used for event routing.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Current display value.
    pub value: Option<String>,
    /// Whether the field is interactable.
    pub disabled: bool,
    /// Validation error shown beneath the field.
    pub error: Option<String>,
    /// Optional tooltip.
    pub tooltip: Option<String>,
}

/// Host-agnostic UI component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    /// Vertical container.
    Container {
        /// Child components.
        children: Vec<Component>,
    },
    /// Visually grouped section.
    Section {
        /// Child components.
        children: Vec<Component>,
    },
    /// Heading text.
    Heading {
        /// Heading text.
        text: String,
    },
    /// Body text.
    Text {
        /// Body text.
        text: String,
    },
    /// Read-only label and value row.
    Row {
        /// Row label.
        label: String,
        /// Row value.
        value: String,
        /// Optional tooltip.
        tooltip: Option<String>,
    },
    /// Editable field.
    Field(Field),
    /// Clickable button.
    Button {
        /// Element name used for event routing.
        name: String,
        /// Button label.
        label: String,
        /// Whether the button is interactable.
        disabled: bool,
        /// Visual variant.
        variant: ButtonVariant,
    },
    /// Loading indicator.
    Spinner,
}

impl Component {
    /// Creates a container from children.
    #[must_use]
    pub const fn container(children: Vec<Self>) -> Self {
        Self::Container { children }
    }

    /// Creates a section from children.
    #[must_use]
    pub const fn section(children: Vec<Self>) -> Self {
        Self::Section { children }
    }

    /// Creates a heading.
    #[must_use]
    pub fn heading(text: impl Into<String>) -> Self {
        Self::Heading { text: text.into() }
    }

    /// Creates body text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a button.
    #[must_use]
    pub fn button(
        name: impl Into<String>,
        label: impl Into<String>,
        disabled: bool,
        variant: ButtonVariant,
    ) -> Self {
        Self::Button {
            name: name.into(),
            label: label.into(),
            disabled,
            variant,
        }
    }

    /// Returns the first component (depth-first) whose element name matches.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        match self {
            Self::Container { children } | Self::Section { children } => {
                children.iter().find_map(|child| child.find(name))
            }
            Self::Field(field) if field.name == name => Some(self),
            Self::Button { name: button, .. } if button == name => Some(self),
            _ => None,
        }
    }
}
