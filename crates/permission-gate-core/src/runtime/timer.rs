// crates/permission-gate-core/src/runtime/timer.rs
// ============================================================================
// Module: Cancellable Timer
// Description: One-shot timeouts that can be cancelled before they fire.
// Purpose: Bound how long a confirmation waits for the user.
// Dependencies: tokio, crate::runtime::audit
// ============================================================================

//! ## Overview
//! [`TimeoutFactory::register`] schedules a single callback on the Tokio timer.
//! The returned [`Timeout`] can be cancelled any number of times.
//! Invariants:
//! - If `cancel` wins the race, the callback never runs.
//! - If the callback already started, `cancel` has no effect on it.
//! - Callback failures and panics are recorded to the audit sink and never
//!   propagated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use tokio::task::AbortHandle;

use crate::runtime::audit::AuditOutcome;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::LifecycleAuditEvent;
use crate::runtime::audit::LifecycleStage;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timeout has neither fired nor been cancelled.
const PENDING: u8 = 0;
/// Timeout callback started.
const FIRED: u8 = 1;
/// Timeout was cancelled before firing.
const CANCELLED: u8 = 2;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure reported by a timeout callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timeout callback failed: {0}")]
pub struct TimerError(pub String);

// ============================================================================
// SECTION: Timeout Factory
// ============================================================================

/// Factory producing cancellable timeouts of a fixed duration.
#[derive(Clone)]
pub struct TimeoutFactory {
    /// Delay before callbacks fire.
    duration: Duration,
    /// Sink for callback failures.
    audit: Arc<dyn AuditSink>,
}

impl TimeoutFactory {
    /// Creates a factory for timeouts of `duration`.
    #[must_use]
    pub fn new(duration: Duration, audit: Arc<dyn AuditSink>) -> Self {
        Self { duration, audit }
    }

    /// Returns the configured timeout duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Schedules `on_timeout` to run once the duration elapses.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register<F, Fut>(&self, on_timeout: F) -> Timeout
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TimerError>> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = Arc::clone(&state);
        let audit = Arc::clone(&self.audit);
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            // The callback runs as its own task so a panic surfaces as a join error.
            let failure = match tokio::spawn(async move { on_timeout().await }).await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(err) if err.is_panic() => Some("timeout callback panicked".to_string()),
                Err(err) => Some(err.to_string()),
            };
            if let Some(message) = failure {
                audit.record(
                    &LifecycleAuditEvent::new(LifecycleStage::Timer, AuditOutcome::Ignored)
                        .message(message),
                );
            }
        });
        Timeout {
            state,
            abort: handle.abort_handle(),
        }
    }
}

// ============================================================================
// SECTION: Timeout Handle
// ============================================================================

/// Handle to a scheduled timeout.
///
/// # Invariants
/// - `cancel` is idempotent and a no-op once the callback started.
#[derive(Debug)]
pub struct Timeout {
    /// Shared pending/fired/cancelled state.
    state: Arc<AtomicU8>,
    /// Abort handle for the sleeping task.
    abort: AbortHandle,
}

impl Timeout {
    /// Cancels the timeout if it has not fired yet.
    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.abort.abort();
        }
    }

    /// Returns true once the callback started.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    /// Returns true when the timeout was cancelled before firing.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}
