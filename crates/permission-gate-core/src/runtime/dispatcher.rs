// crates/permission-gate-core/src/runtime/dispatcher.rs
// ============================================================================
// Module: In-Memory Event Dispatcher
// Description: Routes user input events to bound handlers.
// Purpose: Provide a host-independent dispatcher with pending-handler tracking.
// Dependencies: async-trait, tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryEventDispatcher`] keeps handlers keyed by
//! `(interface id, element name, event kind)`. [`InMemoryEventDispatcher::emit`]
//! spawns every matching handler on the Tokio runtime and tracks it until it
//! completes, so `wait_for_pending_handlers` can drain in-flight edits before
//! finalization reads the latest context.
//! Invariants:
//! - `off` only ever removes the registration it was given.
//! - The pending count returns to zero once every spawned handler finishes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::interfaces::EventBinding;
use crate::interfaces::EventDispatcher;
use crate::interfaces::EventHandler;
use crate::interfaces::HandlerRegistration;
use crate::interfaces::UserInputEvent;

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Bound handlers for one routing key, in binding order.
type HandlerList = Vec<(u64, EventHandler)>;

/// Dispatcher state shared with spawned handler tasks.
struct DispatcherShared {
    /// Handlers by routing key.
    handlers: Mutex<BTreeMap<EventBinding, HandlerList>>,
    /// Next registration id.
    next_id: AtomicU64,
    /// Number of `off` calls received.
    off_calls: AtomicUsize,
    /// Number of handlers spawned but not yet finished.
    pending: watch::Sender<usize>,
}

/// In-memory dispatcher backed by Tokio tasks.
#[derive(Clone)]
pub struct InMemoryEventDispatcher {
    /// Shared state.
    shared: Arc<DispatcherShared>,
}

impl Default for InMemoryEventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            shared: Arc::new(DispatcherShared {
                handlers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                off_calls: AtomicUsize::new(0),
                pending,
            }),
        }
    }

    /// Delivers `event` to every handler bound to its routing key.
    ///
    /// Handlers run as spawned tasks; the return value is how many were started.
    /// Must be called from within a Tokio runtime.
    pub fn emit(&self, event: UserInputEvent) -> usize {
        let key = EventBinding::new(
            event.element_name.clone(),
            event.event_kind,
            event.interface_id.clone(),
        );
        let targets: Vec<EventHandler> = self
            .handlers()
            .get(&key)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();
        for handler in &targets {
            self.shared.pending.send_modify(|count| *count += 1);
            let shared = Arc::clone(&self.shared);
            let future = handler(event.clone());
            tokio::spawn(async move {
                future.await;
                shared.pending.send_modify(|count| *count = count.saturating_sub(1));
            });
        }
        targets.len()
    }

    /// Returns true when at least one handler is bound to `binding`.
    #[must_use]
    pub fn is_bound(&self, binding: &EventBinding) -> bool {
        self.handlers().get(binding).is_some_and(|list| !list.is_empty())
    }

    /// Total number of live registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.handlers().values().map(Vec::len).sum()
    }

    /// Number of `off` calls received.
    #[must_use]
    pub fn off_calls(&self) -> usize {
        self.shared.off_calls.load(Ordering::Acquire)
    }

    /// Number of handlers still running.
    #[must_use]
    pub fn pending_handlers(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Locks the handler table.
    fn handlers(&self) -> MutexGuard<'_, BTreeMap<EventBinding, HandlerList>> {
        self.shared.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventDispatcher for InMemoryEventDispatcher {
    fn on(&self, binding: EventBinding, handler: EventHandler) -> HandlerRegistration {
        let id = self.shared.next_id.fetch_add(1, Ordering::AcqRel);
        self.handlers().entry(binding.clone()).or_default().push((id, handler));
        HandlerRegistration { id, binding }
    }

    fn off(&self, registration: &HandlerRegistration) {
        self.shared.off_calls.fetch_add(1, Ordering::AcqRel);
        let mut handlers = self.handlers();
        if let Some(list) = handlers.get_mut(&registration.binding) {
            list.retain(|(id, _)| *id != registration.id);
            if list.is_empty() {
                handlers.remove(&registration.binding);
            }
        }
    }

    async fn wait_for_pending_handlers(&self) {
        let mut receiver = self.shared.pending.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await.map(|_| ());
    }
}
