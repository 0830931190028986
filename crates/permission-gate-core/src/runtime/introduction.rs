// crates/permission-gate-core/src/runtime/introduction.rs
// ============================================================================
// Module: Permission Introduction
// Description: One-time, two-page explainer shown before a permission type.
// Purpose: Educate the user once per permission type before the first request.
// Dependencies: tokio, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`PermissionIntroductionService`] shows a two-page overlay the first time a
//! permission type is requested. Page 1 offers "Next"; page 2 offers "Got it".
//! Page dots jump between pages. Confirming marks the type as seen; dismissing
//! the overlay (or a failed presentation) reports a cancellation and leaves the
//! type unseen.
//! Invariants:
//! - Each overlay resolves exactly once.
//! - Handlers are unbound before the outcome is reported.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;

use tokio::sync::oneshot;

use crate::core::ButtonVariant;
use crate::core::Component;
use crate::core::InterfaceId;
use crate::core::PermissionType;
use crate::interfaces::EventBinding;
use crate::interfaces::EventDispatcher;
use crate::interfaces::EventHandler;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HandlerRegistration;
use crate::interfaces::HostDialog;
use crate::interfaces::HostError;
use crate::interfaces::IntroductionStateStore;
use crate::interfaces::UserEventKind;
use crate::interfaces::UserInputEvent;
use crate::runtime::audit::AuditOutcome;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::LifecycleAuditEvent;
use crate::runtime::audit::LifecycleStage;
use crate::runtime::dialog::CloseHandler;
use crate::runtime::dialog::DialogSession;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Element name of the page 1 "Next" button.
pub const INTRODUCTION_NEXT_BUTTON: &str = "introduction-next";

/// Element name of the page 1 dot.
pub const INTRODUCTION_PAGE_1_DOT: &str = "introduction-page-1";

/// Element name of the page 2 dot.
pub const INTRODUCTION_PAGE_2_DOT: &str = "introduction-page-2";

/// Element name of the page 2 "Got it" button.
pub const INTRODUCTION_CONFIRM_BUTTON: &str = "introduction-confirm";

// ============================================================================
// SECTION: Content
// ============================================================================

/// One introduction page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroductionPage {
    /// Page heading.
    pub heading: String,
    /// Page body.
    pub body: String,
}

/// Two-page introduction for one permission type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroductionContent {
    /// Overlay title.
    pub title: String,
    /// First page.
    pub first: IntroductionPage,
    /// Second page.
    pub second: IntroductionPage,
}

impl IntroductionContent {
    /// Generic content used when a type registers none.
    #[must_use]
    pub fn generic(permission_type: &PermissionType) -> Self {
        Self {
            title: format!("About {permission_type} permissions"),
            first: IntroductionPage {
                heading: "What you are granting".to_string(),
                body: "The site is asking for a limited permission to act on your account \
                       within the terms shown on the next screen."
                    .to_string(),
            },
            second: IntroductionPage {
                heading: "You stay in control".to_string(),
                body: "You can review and adjust the terms before granting, and every \
                       permission expires."
                    .to_string(),
            },
        }
    }
}

/// Result of showing an introduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntroductionOutcome {
    /// True when the user dismissed the overlay instead of confirming.
    pub was_cancelled: bool,
}

/// Visible introduction page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    /// First page.
    First,
    /// Second page.
    Second,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Shows permission introductions and records which were seen.
pub struct PermissionIntroductionService {
    /// Host dialog service.
    host: Arc<dyn HostDialog>,
    /// Event dispatcher.
    dispatcher: Arc<dyn EventDispatcher>,
    /// Seen-state store.
    store: Arc<dyn IntroductionStateStore>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Registered per-type content.
    contents: BTreeMap<PermissionType, IntroductionContent>,
}

impl PermissionIntroductionService {
    /// Creates a service with generic content for every type.
    #[must_use]
    pub fn new(
        host: Arc<dyn HostDialog>,
        dispatcher: Arc<dyn EventDispatcher>,
        store: Arc<dyn IntroductionStateStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            host,
            dispatcher,
            store,
            audit,
            contents: BTreeMap::new(),
        }
    }

    /// Registers type-specific content.
    #[must_use]
    pub fn with_content(
        mut self,
        permission_type: PermissionType,
        content: IntroductionContent,
    ) -> Self {
        self.contents.insert(permission_type, content);
        self
    }

    /// Returns true when the introduction for the type was not seen yet.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the store cannot be read.
    pub async fn should_show(&self, permission_type: &PermissionType) -> Result<bool, HostError> {
        Ok(!self.store.has_seen(permission_type).await?)
    }

    /// Shows the introduction when it was not seen yet.
    ///
    /// Returns `None` when nothing was shown.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the store or the surface fails.
    pub async fn show_if_needed(
        &self,
        permission_type: &PermissionType,
    ) -> Result<Option<IntroductionOutcome>, HostError> {
        if !self.should_show(permission_type).await? {
            return Ok(None);
        }
        self.show(permission_type).await.map(Some)
    }

    /// Shows the introduction and waits for the user.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the surface cannot be created or the seen
    /// state cannot be written.
    pub async fn show(
        &self,
        permission_type: &PermissionType,
    ) -> Result<IntroductionOutcome, HostError> {
        let content = self
            .contents
            .get(permission_type)
            .cloned()
            .unwrap_or_else(|| IntroductionContent::generic(permission_type));
        let (sender, receiver) = oneshot::channel();
        let overlay = Arc::new(Overlay {
            dialog: DialogSession::new(Arc::clone(&self.host)),
            dispatcher: Arc::clone(&self.dispatcher),
            content,
            state: Mutex::new(OverlayState {
                sender: Some(sender),
                registrations: Vec::new(),
            }),
        });

        let weak = Arc::downgrade(&overlay);
        let on_close: CloseHandler = Arc::new(move || -> HandlerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(overlay) = weak.upgrade() {
                    overlay.finish(true).await;
                }
            })
        });
        let id = overlay.dialog.show(&overlay.render(Page::First), Some(on_close)).await?;
        overlay.bind(&id);

        let was_cancelled = receiver.await.unwrap_or(true);
        let outcome = if was_cancelled {
            AuditOutcome::Denied
        } else {
            self.store.mark_seen(permission_type).await?;
            AuditOutcome::Ok
        };
        self.audit.record(
            &LifecycleAuditEvent::new(LifecycleStage::Introduction, outcome)
                .permission_type(permission_type.clone()),
        );
        Ok(IntroductionOutcome { was_cancelled })
    }
}

// ============================================================================
// SECTION: Overlay
// ============================================================================

/// Mutable overlay state.
struct OverlayState {
    /// Outcome sender, taken on resolution.
    sender: Option<oneshot::Sender<bool>>,
    /// Navigation handler registrations.
    registrations: Vec<HandlerRegistration>,
}

/// One presented introduction overlay.
struct Overlay {
    /// Underlying dialog.
    dialog: DialogSession,
    /// Event dispatcher.
    dispatcher: Arc<dyn EventDispatcher>,
    /// Content being shown.
    content: IntroductionContent,
    /// Mutable state.
    state: Mutex<OverlayState>,
}

/// Overlay navigation actions.
#[derive(Debug, Clone, Copy)]
enum Action {
    /// Show a page.
    Goto(Page),
    /// Confirm and close.
    Confirm,
}

impl Overlay {
    /// Binds navigation handlers for the surface.
    fn bind(self: &Arc<Self>, interface_id: &InterfaceId) {
        let routes = [
            (INTRODUCTION_NEXT_BUTTON, Action::Goto(Page::Second)),
            (INTRODUCTION_PAGE_1_DOT, Action::Goto(Page::First)),
            (INTRODUCTION_PAGE_2_DOT, Action::Goto(Page::Second)),
            (INTRODUCTION_CONFIRM_BUTTON, Action::Confirm),
        ];
        let registrations: Vec<HandlerRegistration> = routes
            .into_iter()
            .map(|(element, action)| {
                self.dispatcher.on(
                    EventBinding::new(element, UserEventKind::ButtonClick, interface_id.clone()),
                    action_handler(Arc::downgrade(self), action),
                )
            })
            .collect();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.sender.is_some() {
            state.registrations = registrations;
        } else {
            drop(state);
            for registration in &registrations {
                self.dispatcher.off(registration);
            }
        }
    }

    /// Switches pages and re-renders.
    async fn goto(&self, page: Page) {
        let open = self.state.lock().unwrap_or_else(PoisonError::into_inner).sender.is_some();
        if open {
            let _ = self.dialog.update(&self.render(page)).await;
        }
    }

    /// Resolves the overlay once.
    async fn finish(&self, was_cancelled: bool) {
        let (sender, registrations) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.sender.take(), std::mem::take(&mut state.registrations))
        };
        let Some(sender) = sender else {
            return;
        };
        for registration in &registrations {
            self.dispatcher.off(registration);
        }
        self.dialog.close().await;
        let _ = sender.send(was_cancelled);
    }

    /// Renders a page.
    fn render(&self, page: Page) -> Component {
        let (body, action) = match page {
            Page::First => (
                &self.content.first,
                Component::button(INTRODUCTION_NEXT_BUTTON, "Next", false, ButtonVariant::Primary),
            ),
            Page::Second => (
                &self.content.second,
                Component::button(
                    INTRODUCTION_CONFIRM_BUTTON,
                    "Got it",
                    false,
                    ButtonVariant::Primary,
                ),
            ),
        };
        let dot = |name: &str, label: &str, current: bool| {
            let variant = if current { ButtonVariant::Primary } else { ButtonVariant::Secondary };
            Component::button(name, label, false, variant)
        };
        Component::container(vec![
            Component::heading(self.content.title.clone()),
            Component::heading(body.heading.clone()),
            Component::text(body.body.clone()),
            Component::section(vec![
                dot(INTRODUCTION_PAGE_1_DOT, "1", page == Page::First),
                dot(INTRODUCTION_PAGE_2_DOT, "2", page == Page::Second),
            ]),
            action,
        ])
    }
}

/// Builds a navigation handler holding only a weak overlay reference.
fn action_handler(overlay: Weak<Overlay>, action: Action) -> EventHandler {
    Arc::new(move |_event: UserInputEvent| -> HandlerFuture {
        let overlay = overlay.clone();
        Box::pin(async move {
            let Some(overlay) = overlay.upgrade() else {
                return;
            };
            match action {
                Action::Goto(page) => overlay.goto(page).await,
                Action::Confirm => overlay.finish(false).await,
            }
        })
    })
}
