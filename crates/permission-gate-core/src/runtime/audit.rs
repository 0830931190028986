// crates/permission-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Lifecycle Audit Logging
// Description: Structured audit events for permission request lifecycles.
// Purpose: Emit JSON-line audit logs without a global logger.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The runtime reports lifecycle milestones and swallowed failures as
//! [`LifecycleAuditEvent`] values. Sinks decide where they go: stderr, an
//! append-only file, memory (for inspection), or nowhere.
//! Invariants:
//! - Signatures and salts are never included in audit payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::ChainId;
use crate::core::PermissionType;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Lifecycle stage an audit event refers to.
///
/// # Invariants
/// - Variants are stable for log labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Request accepted for processing.
    RequestReceived,
    /// Request validation.
    Validation,
    /// Context construction.
    ContextBuild,
    /// Confirmation rendering.
    Render,
    /// User decision.
    Decision,
    /// Optimistic account upgrade.
    AccountUpgrade,
    /// Caveat building, nonce, and signing.
    Finalization,
    /// Permission introduction overlay.
    Introduction,
    /// Timeout callback execution.
    Timer,
}

/// Outcome recorded for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Stage completed.
    Ok,
    /// User granted the permission.
    Granted,
    /// User denied the permission.
    Denied,
    /// Stage failed and aborted the lifecycle.
    Error,
    /// Stage failed and the failure was deliberately ignored.
    Ignored,
}

/// Permission lifecycle audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Lifecycle stage.
    pub stage: LifecycleStage,
    /// Stage outcome.
    pub outcome: AuditOutcome,
    /// Request origin when known.
    pub origin: Option<String>,
    /// Permission type when known.
    pub permission_type: Option<PermissionType>,
    /// Chain identifier when known.
    pub chain_id: Option<ChainId>,
    /// Optional detail message.
    pub message: Option<String>,
}

impl LifecycleAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(stage: LifecycleStage, outcome: AuditOutcome) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "permission_lifecycle",
            timestamp_ms,
            stage,
            outcome,
            origin: None,
            permission_type: None,
            chain_id: None,
            message: None,
        }
    }

    /// Attaches the request origin.
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attaches the permission type.
    #[must_use]
    pub fn permission_type(mut self, permission_type: PermissionType) -> Self {
        self.permission_type = Some(permission_type);
        self
    }

    /// Attaches the chain identifier.
    #[must_use]
    pub const fn chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for lifecycle events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &LifecycleAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &LifecycleAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &LifecycleAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &LifecycleAuditEvent) {}
}

/// Audit sink that keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<LifecycleAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &LifecycleAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
