// crates/permission-gate-core/src/runtime/confirmation.rs
// ============================================================================
// Module: Confirmation Session
// Description: Grant/cancel confirmation dialog raced against a timeout.
// Purpose: Produce exactly one decision outcome per confirmation session.
// Dependencies: tokio, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! A [`ConfirmationSession`] wraps a [`DialogSession`] with Grant and Cancel
//! buttons and a single decision channel. The phase machine is
//! `Uninitialized -> Presented -> Deciding -> {Granted | Cancelled | TimedOut | ErrorClosed}`.
//! Invariants:
//! - Terminal phases are entered only from `Deciding`, through one guarded
//!   check-and-set; every other terminal path observing the new phase is a no-op.
//! - Cleanup (timer cancel, handler unbind, surface close) runs once per session.
//! - A timeout marks the phase before cleanup so in-flight clicks become no-ops.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::ButtonVariant;
use crate::core::Component;
use crate::core::InterfaceId;
use crate::interfaces::EventBinding;
use crate::interfaces::EventDispatcher;
use crate::interfaces::EventHandler;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HandlerRegistration;
use crate::interfaces::HostDialog;
use crate::interfaces::HostError;
use crate::interfaces::UserEventKind;
use crate::interfaces::UserInputEvent;
use crate::runtime::dialog::CloseHandler;
use crate::runtime::dialog::DialogSession;
use crate::runtime::timer::Timeout;
use crate::runtime::timer::TimerError;
use crate::runtime::timer::TimeoutFactory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Element name of the Grant button.
pub const GRANT_BUTTON: &str = "grant-button";

/// Element name of the Cancel button.
pub const CANCEL_BUTTON: &str = "cancel-button";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Phase of a confirmation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not yet shown.
    Uninitialized,
    /// Shown, no decision pending.
    Presented,
    /// Awaiting a decision.
    Deciding,
    /// User granted.
    Granted,
    /// User cancelled or dismissed.
    Cancelled,
    /// No decision before the timeout.
    TimedOut,
    /// Closed by the caller with an error.
    ErrorClosed,
}

impl SessionPhase {
    /// Returns true for terminal phases.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Granted | Self::Cancelled | Self::TimedOut | Self::ErrorClosed)
    }
}

/// Decision reached by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// True when the user granted the permission.
    pub granted: bool,
}

/// Confirmation session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    /// The session API was used out of order.
    #[error("illegal confirmation state: {0}")]
    IllegalState(String),
    /// The user did not decide before the timeout.
    #[error("confirmation timed out")]
    Timeout,
    /// The caller aborted the session.
    #[error("confirmation aborted: {0}")]
    Aborted(String),
    /// The host dialog failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Last-moment validation run before a Grant click is honored.
pub type GrantPredicate = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// Sender half of the decision channel.
type DecisionSender = oneshot::Sender<Result<Decision, ConfirmationError>>;

/// Mutable state of one confirmation session.
pub struct ConfirmationSessionState {
    /// Current phase.
    phase: SessionPhase,
    /// Whether the Grant button is disabled.
    is_grant_disabled: bool,
    /// Latest content (without the Grant/Cancel footer).
    content: Component,
    /// Set when the user dismissed the surface before a decision was awaited.
    dismissed_early: bool,
    /// Timeout racing the decision.
    pending_timeout: Option<Timeout>,
    /// Decision channel sender.
    decision: Option<DecisionSender>,
    /// Grant/Cancel handler registrations.
    registrations: Vec<HandlerRegistration>,
}

/// Resources released by the single terminal transition.
struct TerminalWork {
    /// Timeout to cancel.
    timeout: Option<Timeout>,
    /// Registrations to unbind.
    registrations: Vec<HandlerRegistration>,
    /// Decision sender to settle.
    decision: Option<DecisionSender>,
}

/// Dependencies for a confirmation session.
pub struct ConfirmationSessionParams {
    /// Host dialog service.
    pub host: Arc<dyn HostDialog>,
    /// Event dispatcher.
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Timeout factory racing the decision.
    pub timeouts: TimeoutFactory,
    /// Initial content.
    pub content: Component,
    /// Whether the Grant button starts disabled.
    pub is_grant_disabled: bool,
    /// Optional predicate re-checked on every Grant click.
    pub on_before_grant: Option<GrantPredicate>,
}

/// Shared session internals.
struct Inner {
    /// Underlying dialog surface.
    dialog: DialogSession,
    /// Event dispatcher.
    dispatcher: Arc<dyn EventDispatcher>,
    /// Timeout factory.
    timeouts: TimeoutFactory,
    /// Grant predicate.
    on_before_grant: Option<GrantPredicate>,
    /// Mutable state.
    state: Mutex<ConfirmationSessionState>,
}

// ============================================================================
// SECTION: Pending Decision
// ============================================================================

/// Decision that settles exactly once.
pub struct PendingDecision {
    /// Receiver half of the decision channel.
    receiver: oneshot::Receiver<Result<Decision, ConfirmationError>>,
}

impl PendingDecision {
    /// Waits for the decision.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Timeout`] on timeout and
    /// [`ConfirmationError::Aborted`] when the session was closed with an error.
    pub async fn wait(self) -> Result<Decision, ConfirmationError> {
        self.receiver
            .await
            .map_err(|_| ConfirmationError::Aborted("decision channel dropped".to_string()))?
    }
}

// ============================================================================
// SECTION: Confirmation Session
// ============================================================================

/// Confirmation dialog producing a single decision.
#[derive(Clone)]
pub struct ConfirmationSession {
    /// Shared internals.
    inner: Arc<Inner>,
}

impl ConfirmationSession {
    /// Creates an uninitialized session.
    #[must_use]
    pub fn new(params: ConfirmationSessionParams) -> Self {
        let state = ConfirmationSessionState {
            phase: SessionPhase::Uninitialized,
            is_grant_disabled: params.is_grant_disabled,
            content: params.content,
            dismissed_early: false,
            pending_timeout: None,
            decision: None,
            registrations: Vec::new(),
        };
        Self {
            inner: Arc::new(Inner {
                dialog: DialogSession::new(params.host),
                dispatcher: params.dispatcher,
                timeouts: params.timeouts,
                on_before_grant: params.on_before_grant,
                state: Mutex::new(state),
            }),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().map_or(SessionPhase::ErrorClosed, |state| state.phase)
    }

    /// Returns the surface id once initialized.
    #[must_use]
    pub fn interface_id(&self) -> Option<InterfaceId> {
        self.inner.dialog.id()
    }

    /// Returns whether the Grant button is currently disabled.
    #[must_use]
    pub fn is_grant_disabled(&self) -> bool {
        self.inner.lock().is_ok_and(|state| state.is_grant_disabled)
    }

    /// Presents the session for the first time and returns the surface id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::IllegalState`] when already initialized and
    /// [`ConfirmationError::Host`] when the surface cannot be created.
    pub async fn initialize(&self) -> Result<InterfaceId, ConfirmationError> {
        let ui = {
            let state = self.inner.lock()?;
            if state.phase != SessionPhase::Uninitialized {
                return Err(ConfirmationError::IllegalState(
                    "confirmation already initialized".to_string(),
                ));
            }
            compose(&state.content, state.is_grant_disabled)
        };
        let weak = Arc::downgrade(&self.inner);
        let on_close: CloseHandler = Arc::new(move || -> HandlerFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.dismiss().await;
                }
            })
        });
        let id = self.inner.dialog.show(&ui, Some(on_close)).await?;
        let mut state = self.inner.lock()?;
        if state.phase == SessionPhase::Uninitialized {
            state.phase = SessionPhase::Presented;
        }
        Ok(id)
    }

    /// Arms the timeout, binds Grant/Cancel, and returns the pending decision.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::IllegalState`] when the session was not
    /// initialized or a decision is already pending or settled.
    pub fn display_and_await_decision(&self) -> Result<PendingDecision, ConfirmationError> {
        let interface_id = self.inner.dialog.id();
        let (sender, receiver) = oneshot::channel();
        let mut state = self.inner.lock()?;
        match state.phase {
            SessionPhase::Presented => {}
            SessionPhase::Uninitialized => {
                return Err(ConfirmationError::IllegalState(
                    "confirmation awaited before initialize".to_string(),
                ));
            }
            phase => {
                return Err(ConfirmationError::IllegalState(format!(
                    "decision already requested (phase {})",
                    phase_label(phase)
                )));
            }
        }
        if state.dismissed_early {
            state.phase = SessionPhase::Cancelled;
            let _ = sender.send(Ok(Decision { granted: false }));
            return Ok(PendingDecision { receiver });
        }
        let Some(interface_id) = interface_id else {
            return Err(ConfirmationError::IllegalState(
                "confirmation surface is not open".to_string(),
            ));
        };

        state.phase = SessionPhase::Deciding;
        state.decision = Some(sender);

        let weak = Arc::downgrade(&self.inner);
        state.pending_timeout = Some(self.inner.timeouts.register(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.settle(SessionPhase::TimedOut, Err(ConfirmationError::Timeout)).await;
            }
            Ok::<(), TimerError>(())
        }));

        let grant = bind_click(&self.inner, GRANT_BUTTON, &interface_id, |inner| {
            Box::pin(async move { inner.grant().await })
        });
        let cancel = bind_click(&self.inner, CANCEL_BUTTON, &interface_id, |inner| {
            Box::pin(async move {
                inner.settle(SessionPhase::Cancelled, Ok(Decision { granted: false })).await;
            })
        });
        state.registrations = vec![grant, cancel];
        drop(state);
        Ok(PendingDecision { receiver })
    }

    /// Re-renders the content without re-presenting the surface.
    ///
    /// Updates after a terminal phase, or racing the surface close, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Host`] when the host update fails.
    pub async fn update_content(
        &self,
        content: Component,
        is_grant_disabled: bool,
    ) -> Result<(), ConfirmationError> {
        let ui = {
            let mut state = self.inner.lock()?;
            if state.phase.is_terminal() {
                return Ok(());
            }
            state.content = content;
            state.is_grant_disabled = is_grant_disabled;
            if state.phase == SessionPhase::Uninitialized {
                return Ok(());
            }
            compose(&state.content, state.is_grant_disabled)
        };
        self.inner.dialog.update(&ui).await?;
        Ok(())
    }

    /// Aborts the session: cleans up, closes the surface, and rejects a pending decision.
    ///
    /// Idempotent; later calls only re-issue a harmless surface close.
    pub async fn close_with_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let work = self.inner.lock().ok().and_then(|mut state| {
            if state.phase.is_terminal() {
                return None;
            }
            state.phase = SessionPhase::ErrorClosed;
            Some(take_terminal_work(&mut state))
        });
        match work {
            Some(work) => {
                self.inner.cleanup(work, Err(ConfirmationError::Aborted(reason))).await;
            }
            None => self.inner.dialog.close().await,
        }
    }
}

impl Inner {
    /// Locks the session state.
    fn lock(&self) -> Result<MutexGuard<'_, ConfirmationSessionState>, ConfirmationError> {
        self.state
            .lock()
            .map_err(|_| ConfirmationError::IllegalState("confirmation state poisoned".to_string()))
    }

    /// Handles a Grant click.
    async fn grant(&self) {
        let deciding = self.lock().is_ok_and(|state| state.phase == SessionPhase::Deciding);
        if !deciding {
            return;
        }
        if let Some(predicate) = &self.on_before_grant
            && !predicate().await
        {
            return;
        }
        self.settle(SessionPhase::Granted, Ok(Decision { granted: true })).await;
    }

    /// Handles the user dismissing the surface.
    async fn dismiss(&self) {
        let before_decision = self.lock().is_ok_and(|mut state| {
            if state.phase == SessionPhase::Presented {
                state.dismissed_early = true;
                true
            } else {
                false
            }
        });
        if !before_decision {
            self.settle(SessionPhase::Cancelled, Ok(Decision { granted: false })).await;
        }
    }

    /// Transitions `Deciding -> outcome` once and settles the decision.
    async fn settle(&self, outcome: SessionPhase, result: Result<Decision, ConfirmationError>) {
        let work = self.lock().ok().and_then(|mut state| {
            if state.phase != SessionPhase::Deciding {
                return None;
            }
            state.phase = outcome;
            Some(take_terminal_work(&mut state))
        });
        if let Some(work) = work {
            self.cleanup(work, result).await;
        }
    }

    /// Cancels the timer, unbinds handlers, closes the surface, then settles.
    async fn cleanup(&self, work: TerminalWork, result: Result<Decision, ConfirmationError>) {
        if let Some(timeout) = work.timeout {
            timeout.cancel();
        }
        for registration in &work.registrations {
            self.dispatcher.off(registration);
        }
        self.dialog.close().await;
        if let Some(decision) = work.decision {
            let _ = decision.send(result);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Moves terminal resources out of the state.
fn take_terminal_work(state: &mut ConfirmationSessionState) -> TerminalWork {
    TerminalWork {
        timeout: state.pending_timeout.take(),
        registrations: std::mem::take(&mut state.registrations),
        decision: state.decision.take(),
    }
}

/// Binds a click handler that holds only a weak reference to the session.
fn bind_click<F>(
    inner: &Arc<Inner>,
    element: &str,
    interface_id: &InterfaceId,
    action: F,
) -> HandlerRegistration
where
    F: Fn(Arc<Inner>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
{
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let action = Arc::new(action);
    let handler: EventHandler = Arc::new(move |_event: UserInputEvent| -> HandlerFuture {
        let weak = weak.clone();
        let action = Arc::clone(&action);
        Box::pin(async move {
            if let Some(inner) = weak.upgrade() {
                action(inner).await;
            }
        })
    });
    inner.dispatcher.on(
        EventBinding::new(element, UserEventKind::ButtonClick, interface_id.clone()),
        handler,
    )
}

/// Wraps content with the Grant/Cancel footer.
fn compose(content: &Component, is_grant_disabled: bool) -> Component {
    Component::container(vec![
        content.clone(),
        Component::section(vec![
            Component::button(CANCEL_BUTTON, "Cancel", false, ButtonVariant::Secondary),
            Component::button(GRANT_BUTTON, "Grant", is_grant_disabled, ButtonVariant::Primary),
        ]),
    ])
}

/// Returns a stable label for a phase.
const fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Uninitialized => "uninitialized",
        SessionPhase::Presented => "presented",
        SessionPhase::Deciding => "deciding",
        SessionPhase::Granted => "granted",
        SessionPhase::Cancelled => "cancelled",
        SessionPhase::TimedOut => "timed_out",
        SessionPhase::ErrorClosed => "error_closed",
    }
}
