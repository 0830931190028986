// crates/permission-gate-core/src/runtime/dialog.rs
// ============================================================================
// Module: Dialog Session
// Description: Ownership of a single host-rendered surface.
// Purpose: Create-or-update a surface, present it once, and close it safely.
// Dependencies: tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! A [`DialogSession`] owns at most one live surface. The first `show` creates
//! and presents it; later calls update it in place under the same id.
//! Presentation runs in the background until the user dismisses the surface or
//! the session resolves it programmatically.
//! Invariants:
//! - The interface id never changes once assigned, until `close` forgets it.
//! - A closed session never creates another surface.
//! - The close handler runs at most once, and only for user dismissal or a
//!   failed presentation; programmatic closes never invoke it.
//! - `close` never propagates host failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde_json::Value;

use crate::core::Component;
use crate::core::InterfaceId;
use crate::interfaces::HandlerFuture;
use crate::interfaces::HostDialog;
use crate::interfaces::HostError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Handler invoked when the user dismisses the surface.
pub type CloseHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Live surface tracked by the session.
struct Surface {
    /// Host-assigned id.
    id: InterfaceId,
    /// Token tying a presentation task to this surface.
    token: u64,
}

/// Mutable session state.
#[derive(Default)]
struct DialogState {
    /// Live surface, if any.
    surface: Option<Surface>,
    /// Latest registered close handler.
    on_close: Option<CloseHandler>,
    /// Next presentation token.
    next_token: u64,
    /// Set by `close`; the session is finished.
    closed: bool,
}

// ============================================================================
// SECTION: Dialog Session
// ============================================================================

/// Session owning one host dialog surface.
pub struct DialogSession {
    /// Host dialog service.
    host: Arc<dyn HostDialog>,
    /// Shared state, also observed by the presentation task.
    state: Arc<Mutex<DialogState>>,
    /// Serializes `show` so concurrent calls never create two surfaces.
    show_lock: tokio::sync::Mutex<()>,
}

impl DialogSession {
    /// Creates a session with no surface.
    #[must_use]
    pub fn new(host: Arc<dyn HostDialog>) -> Self {
        Self {
            host,
            state: Arc::new(Mutex::new(DialogState::default())),
            show_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the surface id, if one was created and not yet closed.
    #[must_use]
    pub fn id(&self) -> Option<InterfaceId> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.surface.as_ref().map(|surface| surface.id.clone()))
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed
    }

    /// Shows `ui`, creating and presenting the surface on first use.
    ///
    /// A supplied `on_close` replaces the previous handler; `None` keeps it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the surface cannot be created or updated, or
    /// when the session was closed. Presentation failures are reported through
    /// the close handler instead.
    pub async fn show(
        &self,
        ui: &Component,
        on_close: Option<CloseHandler>,
    ) -> Result<InterfaceId, HostError> {
        let _guard = self.show_lock.lock().await;
        let existing = {
            let mut state = self.lock_state()?;
            if state.closed {
                return Err(HostError::new("dialog session closed"));
            }
            if let Some(handler) = on_close {
                state.on_close = Some(handler);
            }
            state.surface.as_ref().map(|surface| surface.id.clone())
        };
        if let Some(id) = existing {
            self.host.update_surface(&id, ui).await?;
            return Ok(id);
        }

        let id = self.host.create_surface(ui).await?;
        let token = {
            let mut state = self.lock_state()?;
            if state.closed {
                None
            } else {
                let token = state.next_token;
                state.next_token += 1;
                state.surface = Some(Surface {
                    id: id.clone(),
                    token,
                });
                Some(token)
            }
        };
        let Some(token) = token else {
            // Closed while the surface was being created.
            let _ = self.host.resolve_surface(&id, Value::Null).await;
            return Err(HostError::new("dialog session closed"));
        };
        self.spawn_presentation(id.clone(), token);
        Ok(id)
    }

    /// Updates the live surface in place; never creates one.
    ///
    /// Returns `Ok(false)` when there is no live surface, including after
    /// `close`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the host rejects the update of a surface
    /// that is still live.
    pub async fn update(&self, ui: &Component) -> Result<bool, HostError> {
        let _guard = self.show_lock.lock().await;
        let Some(id) = self.id() else {
            return Ok(false);
        };
        match self.host.update_surface(&id, ui).await {
            Ok(()) => Ok(true),
            Err(_) if self.is_closed() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Resolves the live surface and forgets its id. Safe to call repeatedly.
    ///
    /// Later `show` calls fail and later `update` calls do nothing.
    pub async fn close(&self) {
        let surface = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.surface.take()
        };
        if let Some(surface) = surface {
            let _ = self.host.resolve_surface(&surface.id, Value::Null).await;
        }
    }

    /// Locks the state, mapping poisoning to a host error.
    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, DialogState>, HostError> {
        self.state.lock().map_err(|_| HostError::new("dialog state lock poisoned"))
    }

    /// Presents the surface in the background and routes user dismissal.
    fn spawn_presentation(&self, id: InterfaceId, token: u64) {
        let host = Arc::clone(&self.host);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            // Both a dismissal and a failed presentation count as the user closing.
            let _ = host.present_surface(&id).await;
            let handler = state.lock().ok().and_then(|mut state| {
                let still_live =
                    state.surface.as_ref().is_some_and(|surface| surface.token == token);
                if still_live { state.on_close.take() } else { None }
            });
            if let Some(handler) = handler {
                handler().await;
            }
        });
    }
}
