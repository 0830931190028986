// crates/permission-gate-core/tests/rules.rs
// ============================================================================
// Module: Rule Rendering Tests
// Description: Field shapes, configuration errors, and edit handlers.
// Purpose: Ensure descriptors render and edit contexts predictably.
// ============================================================================

//! ## Overview
//! Renders the stream fixture's rules under different contexts and drives
//! their edit handlers through the in-memory dispatcher.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use permission_gate_core::ButtonVariant;
use permission_gate_core::Component;
use permission_gate_core::EventDispatcher;
use permission_gate_core::Field;
use permission_gate_core::FieldKind;
use permission_gate_core::HandlerFuture;
use permission_gate_core::InterfaceId;
use permission_gate_core::runtime::ContextCell;
use permission_gate_core::runtime::ContextEdit;
use permission_gate_core::runtime::ContextPublisher;
use permission_gate_core::runtime::InMemoryEventDispatcher;
use permission_gate_core::runtime::RuleData;
use permission_gate_core::runtime::RuleDescriptor;
use permission_gate_core::runtime::RuleError;
use permission_gate_core::runtime::RuleFieldType;
use permission_gate_core::runtime::bind_rule_handlers;
use permission_gate_core::runtime::render_rule;
use permission_gate_core::runtime::render_rules;

use crate::common::AMOUNT_RULE;
use crate::common::EXPIRY_RULE;
use crate::common::MAX_AMOUNT_RULE;
use crate::common::StreamContext;
use crate::common::StreamMetadata;
use crate::common::click;
use crate::common::input;
use crate::common::settle;
use crate::common::stream_context;
use crate::common::stream_metadata;
use crate::common::stream_rules;

fn render(context: &StreamContext) -> Vec<Component> {
    render_rules(&stream_rules(), context, &stream_metadata(context)).unwrap()
}

#[test]
fn required_rules_render_as_fields_and_unset_optionals_are_hidden() {
    let rendered = render(&stream_context());

    assert_eq!(rendered.len(), 2);
    assert_eq!(
        rendered[0],
        Component::Field(Field {
            name: AMOUNT_RULE.to_string(),
            label: "Amount per second".to_string(),
            kind: FieldKind::Number,
            value: Some("0x1".to_string()),
            disabled: false,
            error: None,
            tooltip: Some("Tokens streamed each second".to_string()),
        })
    );
    assert!(matches!(&rendered[1], Component::Field(field) if field.kind == FieldKind::DateTime));
}

#[test]
fn set_optional_rule_renders_with_remove_button() {
    let context = StreamContext {
        max_amount: Some("100".to_string()),
        ..stream_context()
    };
    let rendered = render(&context);

    assert_eq!(rendered.len(), 3);
    let Component::Section { children } = &rendered[2] else {
        panic!("expected section, got {:?}", rendered[2]);
    };
    assert!(matches!(&children[0], Component::Field(field) if field.name == MAX_AMOUNT_RULE));
    assert_eq!(
        children[1],
        Component::button("maxAmount_removeButton", "Remove", false, ButtonVariant::Destructive)
    );
}

#[test]
fn disallowed_adjustment_renders_read_only_rows() {
    let context = StreamContext {
        adjustable: false,
        ..stream_context()
    };
    let rendered = render(&context);

    assert_eq!(
        rendered[0],
        Component::Row {
            label: "Amount per second".to_string(),
            value: "0x1".to_string(),
            tooltip: Some("Tokens streamed each second".to_string()),
        }
    );
    assert!(matches!(&rendered[1], Component::Row { label, .. } if label == "Expiry"));
}

#[test]
fn unset_required_rule_renders_disabled_placeholder() {
    let context = StreamContext {
        expiry: None,
        ..stream_context()
    };
    let rendered = render(&context);

    let Component::Field(field) = &rendered[1] else {
        panic!("expected field, got {:?}", rendered[1]);
    };
    assert_eq!(field.name, EXPIRY_RULE);
    assert!(field.disabled);
    assert_eq!(field.value, None);
}

#[test]
fn validation_errors_attach_to_their_field() {
    let context = StreamContext {
        amount_per_second: Some("0".to_string()),
        ..stream_context()
    };
    let rendered = render(&context);

    let Component::Field(field) = &rendered[0] else {
        panic!("expected field, got {:?}", rendered[0]);
    };
    assert_eq!(field.error.as_deref(), Some("must be a positive amount"));
}

#[test]
fn hidden_rules_render_nothing() {
    let rule: RuleDescriptor<StreamContext, StreamMetadata> = RuleDescriptor::new(
        "hidden",
        "Hidden",
        RuleFieldType::Text,
        |_: &StreamContext, _: &StreamMetadata| RuleData {
            value: Some("secret".to_string()),
            is_visible: false,
            is_editable: true,
        },
        |context: &StreamContext, _| context.clone(),
    );
    let context = stream_context();

    assert_eq!(render_rule(&rule, &context, &stream_metadata(&context)), Ok(None));
}

#[test]
fn dropdown_requires_options() {
    let dropdown = || {
        RuleDescriptor::<StreamContext, StreamMetadata>::new(
            "period",
            "Period",
            RuleFieldType::Dropdown,
            |_: &StreamContext, _: &StreamMetadata| RuleData::editable(Some("daily".to_string())),
            |context: &StreamContext, _| context.clone(),
        )
    };
    let context = stream_context();
    let metadata = stream_metadata(&context);

    assert!(matches!(
        render_rule(&dropdown(), &context, &metadata),
        Err(RuleError::Configuration(_))
    ));
    let with_options = dropdown().options(vec!["daily".to_string(), "weekly".to_string()]);
    let rendered = render_rule(&with_options, &context, &metadata).unwrap().unwrap();
    let Component::Field(field) = &rendered else {
        panic!("expected field, got {rendered:?}");
    };
    assert_eq!(
        field.kind,
        FieldKind::Dropdown {
            options: vec!["daily".to_string(), "weekly".to_string()],
        }
    );
}

#[test]
fn field_types_parse_from_names() {
    assert_eq!("text".parse::<RuleFieldType>(), Ok(RuleFieldType::Text));
    assert_eq!("number".parse::<RuleFieldType>(), Ok(RuleFieldType::Number));
    assert_eq!("dropdown".parse::<RuleFieldType>(), Ok(RuleFieldType::Dropdown));
    assert_eq!("datetime".parse::<RuleFieldType>(), Ok(RuleFieldType::DateTime));
    assert!(matches!("slider".parse::<RuleFieldType>(), Err(RuleError::Configuration(_))));
}

/// Publisher that commits into `cell` and renders after a yield.
fn cell_publisher(cell: &Arc<ContextCell<StreamContext>>) -> ContextPublisher<StreamContext> {
    let cell = cell.clone();
    Arc::new(move |edit: ContextEdit<StreamContext>| -> HandlerFuture {
        cell.update(edit);
        Box::pin(async {
            tokio::task::yield_now().await;
        })
    })
}

#[tokio::test]
async fn edit_handlers_publish_new_contexts() {
    let dispatcher = InMemoryEventDispatcher::new();
    let shared: Arc<dyn EventDispatcher> = Arc::new(dispatcher.clone());
    let surface = InterfaceId::new("surface-1");
    let initial = StreamContext {
        max_amount: Some("100".to_string()),
        ..stream_context()
    };
    let cell = Arc::new(ContextCell::new(initial.clone()));
    let publish = cell_publisher(&cell);

    let mut bindings = bind_rule_handlers(&stream_rules(), &shared, &surface, &publish);
    assert_eq!(bindings.len(), 6);

    input(&dispatcher, &surface, AMOUNT_RULE, "0x10");
    settle(&dispatcher).await;
    click(&dispatcher, &surface, "maxAmount_removeButton");
    settle(&dispatcher).await;

    let (generation, current) = cell.snapshot();
    assert_eq!(generation, 2);
    assert_eq!(current.amount_per_second.as_deref(), Some("0x10"));
    assert_eq!(current.max_amount, None);
    assert_eq!(initial.amount_per_second.as_deref(), Some("0x1"));

    bindings.unbind();
    bindings.unbind();
    assert!(bindings.is_empty());
    assert_eq!(dispatcher.off_calls(), 6);
    assert_eq!(dispatcher.registration_count(), 0);
}

#[tokio::test]
async fn back_to_back_edits_both_land() {
    let dispatcher = InMemoryEventDispatcher::new();
    let shared: Arc<dyn EventDispatcher> = Arc::new(dispatcher.clone());
    let surface = InterfaceId::new("surface-1");
    let cell = Arc::new(ContextCell::new(stream_context()));
    let publish = cell_publisher(&cell);
    let mut bindings = bind_rule_handlers(&stream_rules(), &shared, &surface, &publish);

    input(&dispatcher, &surface, AMOUNT_RULE, "0x10");
    input(&dispatcher, &surface, EXPIRY_RULE, "1800000000");
    settle(&dispatcher).await;

    let (generation, current) = cell.snapshot();
    assert_eq!(generation, 2);
    assert_eq!(current.amount_per_second.as_deref(), Some("0x10"));
    assert_eq!(current.expiry.as_deref(), Some("1800000000"));
    bindings.unbind();
}
