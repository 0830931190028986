// crates/permission-gate-core/tests/rule_modal.rs
// ============================================================================
// Module: Rule Modal Tests
// Description: Add-rule affordance, edit buffer, and save semantics.
// Purpose: Ensure unset optional rules can be added and only when valid.
// ============================================================================

//! ## Overview
//! Drives [`RuleModalManager`] directly and through dispatcher events using
//! the stream fixture's optional rules.

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
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use permission_gate_core::ButtonVariant;
use permission_gate_core::Component;
use permission_gate_core::FieldKind;
use permission_gate_core::HandlerFuture;
use permission_gate_core::InterfaceId;
use permission_gate_core::runtime::ADD_RULE_TOGGLE;
use permission_gate_core::runtime::AuditOutcome;
use permission_gate_core::runtime::ContextCell;
use permission_gate_core::runtime::ContextEdit;
use permission_gate_core::runtime::DefinitionError;
use permission_gate_core::runtime::InMemoryEventDispatcher;
use permission_gate_core::runtime::LifecycleStage;
use permission_gate_core::runtime::MemoryAuditSink;
use permission_gate_core::runtime::MetadataDeriver;
use permission_gate_core::runtime::MetadataFuture;
use permission_gate_core::runtime::RULE_SELECT;
use permission_gate_core::runtime::RULE_VALUE_INPUT;
use permission_gate_core::runtime::RuleError;
use permission_gate_core::runtime::RuleModalManager;
use permission_gate_core::runtime::RuleModalParams;
use permission_gate_core::runtime::SAVE_RULE_BUTTON;

use crate::common::MAX_AMOUNT_RULE;
use crate::common::START_TIME_RULE;
use crate::common::StreamContext;
use crate::common::StreamMetadata;
use crate::common::click;
use crate::common::input;
use crate::common::settle;
use crate::common::stream_context;
use crate::common::stream_metadata;
use crate::common::stream_rules;

struct Modal {
    manager: RuleModalManager<StreamContext, StreamMetadata>,
    dispatcher: InMemoryEventDispatcher,
    surface: InterfaceId,
    cell: Arc<ContextCell<StreamContext>>,
    renders: Arc<AtomicUsize>,
    audit: Arc<MemoryAuditSink>,
}

fn metadata_deriver(fail: bool) -> MetadataDeriver<StreamContext, StreamMetadata> {
    Arc::new(move |context: StreamContext| -> MetadataFuture<StreamMetadata> {
        Box::pin(async move {
            if fail {
                return Err(DefinitionError::Validation("metadata offline".to_string()));
            }
            Ok(stream_metadata(&context))
        })
    })
}

fn modal(context: StreamContext, fail_metadata: bool) -> Modal {
    modal_with(ContextCell::new(context), |_| metadata_deriver(fail_metadata))
}

fn modal_with(
    cell: ContextCell<StreamContext>,
    deriver: impl FnOnce(
        Arc<ContextCell<StreamContext>>,
    ) -> MetadataDeriver<StreamContext, StreamMetadata>,
) -> Modal {
    let dispatcher = InMemoryEventDispatcher::new();
    let surface = InterfaceId::new("surface-1");
    let cell = Arc::new(cell);
    let audit = Arc::new(MemoryAuditSink::new());
    let renders = Arc::new(AtomicUsize::new(0));
    let reader = cell.clone();
    let writer = cell.clone();
    let counter = renders.clone();
    let manager = RuleModalManager::new(RuleModalParams {
        rules: stream_rules().into_iter().filter(|rule| rule.is_optional).collect(),
        dispatcher: Arc::new(dispatcher.clone()),
        interface_id: surface.clone(),
        get_context: Arc::new(move || reader.get()),
        derive_metadata: deriver(cell.clone()),
        on_context_changed: Arc::new(
            move |edit: ContextEdit<StreamContext>| -> HandlerFuture {
                writer.update(edit);
                Box::pin(async {})
            },
        ),
        on_modal_changed: Arc::new(move || -> HandlerFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }),
        audit: audit.clone(),
    });
    Modal {
        manager,
        dispatcher,
        surface,
        cell,
        renders,
        audit,
    }
}

async fn rendered(modal: &Modal) -> Option<Component> {
    let context = modal.cell.get();
    modal.manager.render_modal(&context, &stream_metadata(&context)).await.unwrap()
}

fn save_disabled(component: &Component) -> bool {
    match component.find(SAVE_RULE_BUTTON) {
        Some(Component::Button { disabled, .. }) => *disabled,
        other => panic!("save button missing: {other:?}"),
    }
}

#[test]
fn offers_rules_only_while_some_optional_rule_is_unset() {
    let modal = modal(stream_context(), false);
    let none_set = stream_context();
    let one_set = StreamContext {
        max_amount: Some("100".to_string()),
        ..stream_context()
    };
    let all_set = StreamContext {
        start_time: Some("1700000000".to_string()),
        ..one_set.clone()
    };

    assert!(modal.manager.has_rules_to_add(&none_set, &stream_metadata(&none_set)));
    assert!(modal.manager.has_rules_to_add(&one_set, &stream_metadata(&one_set)));
    assert!(!modal.manager.has_rules_to_add(&all_set, &stream_metadata(&all_set)));
}

#[tokio::test]
async fn renders_toggle_then_editor() {
    let modal = modal(stream_context(), false);

    assert_eq!(
        rendered(&modal).await,
        Some(Component::button(ADD_RULE_TOGGLE, "Add more rules", false, ButtonVariant::Secondary))
    );

    modal.manager.toggle().await;
    assert!(modal.manager.is_modal_visible());
    let editor = rendered(&modal).await.unwrap();
    match editor.find(RULE_SELECT) {
        Some(Component::Field(field)) => {
            assert_eq!(
                field.kind,
                FieldKind::Dropdown {
                    options: vec![MAX_AMOUNT_RULE.to_string(), START_TIME_RULE.to_string()],
                }
            );
            assert_eq!(field.value.as_deref(), Some(MAX_AMOUNT_RULE));
        }
        other => panic!("rule select missing: {other:?}"),
    }
    assert!(save_disabled(&editor));

    modal.manager.set_pending_value("not a number").await;
    assert!(save_disabled(&rendered(&modal).await.unwrap()));
    modal.manager.set_pending_value("250").await;
    assert!(!save_disabled(&rendered(&modal).await.unwrap()));
    assert_eq!(modal.renders.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn nothing_rendered_when_every_rule_is_set() {
    let modal = modal(
        StreamContext {
            max_amount: Some("100".to_string()),
            start_time: Some("1700000000".to_string()),
            ..stream_context()
        },
        false,
    );

    assert_eq!(rendered(&modal).await, None);
}

#[tokio::test]
async fn save_commits_selected_rule_and_closes() {
    let modal = modal(stream_context(), false);
    modal.manager.toggle().await;

    assert_eq!(modal.manager.save().await, Ok(false));

    modal.manager.select(START_TIME_RULE).await;
    modal.manager.set_pending_value("1700000123").await;
    assert_eq!(modal.manager.save().await, Ok(true));

    let context = modal.cell.get();
    assert_eq!(context.start_time.as_deref(), Some("1700000123"));
    assert_eq!(context.max_amount, None);
    assert!(!modal.manager.is_modal_visible());
}

#[tokio::test]
async fn unknown_selection_fails_save() {
    let modal = modal(stream_context(), false);
    modal.manager.toggle().await;
    modal.manager.select("gasLimit").await;
    modal.manager.set_pending_value("5").await;

    assert!(matches!(modal.manager.save().await, Err(RuleError::NotFound(_))));
    assert_eq!(modal.cell.generation(), 0);
}

#[tokio::test]
async fn metadata_failure_fails_save() {
    let modal = modal(stream_context(), true);
    modal.manager.toggle().await;
    modal.manager.set_pending_value("5").await;

    assert!(matches!(modal.manager.save().await, Err(RuleError::Metadata(_))));
    assert_eq!(modal.cell.generation(), 0);
}

#[tokio::test]
async fn event_handlers_drive_the_modal() {
    let modal = modal(stream_context(), false);
    modal.manager.bind_handlers();
    assert_eq!(modal.manager.registration_count(), 4);
    assert_eq!(modal.dispatcher.registration_count(), 4);

    click(&modal.dispatcher, &modal.surface, ADD_RULE_TOGGLE);
    settle(&modal.dispatcher).await;
    assert!(modal.manager.is_modal_visible());
    input(&modal.dispatcher, &modal.surface, RULE_SELECT, MAX_AMOUNT_RULE);
    settle(&modal.dispatcher).await;
    input(&modal.dispatcher, &modal.surface, RULE_VALUE_INPUT, "0x20");
    settle(&modal.dispatcher).await;
    click(&modal.dispatcher, &modal.surface, SAVE_RULE_BUTTON);
    settle(&modal.dispatcher).await;

    assert_eq!(modal.cell.get().max_amount.as_deref(), Some("0x20"));

    modal.manager.unbind_handlers();
    modal.manager.unbind_handlers();
    assert_eq!(modal.manager.registration_count(), 0);
    assert_eq!(modal.dispatcher.registration_count(), 0);
    assert_eq!(modal.dispatcher.off_calls(), 4);
}

#[tokio::test]
async fn save_keeps_edits_committed_while_metadata_is_derived() {
    // Once armed, the deriver lands a field edit before the save commits.
    let armed = Arc::new(AtomicBool::new(false));
    let trigger = armed.clone();
    let modal = modal_with(ContextCell::new(stream_context()), move |cell| {
        Arc::new(move |context: StreamContext| -> MetadataFuture<StreamMetadata> {
            let cell = cell.clone();
            let fire = trigger.swap(false, Ordering::SeqCst);
            Box::pin(async move {
                if fire {
                    cell.update(|current| StreamContext {
                        amount_per_second: Some("0x99".to_string()),
                        ..current.clone()
                    });
                }
                Ok(stream_metadata(&context))
            })
        })
    });
    modal.manager.toggle().await;
    modal.manager.select(START_TIME_RULE).await;
    modal.manager.set_pending_value("1700000123").await;
    armed.store(true, Ordering::SeqCst);

    assert_eq!(modal.manager.save().await, Ok(true));

    let context = modal.cell.get();
    assert_eq!(context.amount_per_second.as_deref(), Some("0x99"));
    assert_eq!(context.start_time.as_deref(), Some("1700000123"));
    assert_eq!(modal.cell.generation(), 2);
}

#[tokio::test]
async fn failed_save_from_the_surface_is_audited() {
    let modal = modal(stream_context(), true);
    modal.manager.bind_handlers();
    click(&modal.dispatcher, &modal.surface, ADD_RULE_TOGGLE);
    settle(&modal.dispatcher).await;
    input(&modal.dispatcher, &modal.surface, RULE_VALUE_INPUT, "5");
    settle(&modal.dispatcher).await;
    click(&modal.dispatcher, &modal.surface, SAVE_RULE_BUTTON);
    settle(&modal.dispatcher).await;

    let events = modal.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stage, LifecycleStage::Render);
    assert_eq!(events[0].outcome, AuditOutcome::Ignored);
    assert!(events[0].message.as_deref().unwrap().contains("metadata offline"));
    assert!(modal.manager.is_modal_visible());
    assert_eq!(modal.cell.generation(), 0);
}
