// crates/permission-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Introduction State Store
// Description: In-memory record of seen permission introductions.
// Purpose: Back the introduction overlay when no persistent store is wired.
// Dependencies: async-trait, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Process-local implementation of [`IntroductionStateStore`]. State does not
//! survive restarts; hosts with persistent storage supply their own store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::PermissionType;
use crate::interfaces::HostError;
use crate::interfaces::IntroductionStateStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory introduction state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIntroductionStateStore {
    /// Permission types whose introduction was seen.
    seen: Arc<Mutex<BTreeSet<PermissionType>>>,
}

impl InMemoryIntroductionStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntroductionStateStore for InMemoryIntroductionStateStore {
    async fn has_seen(&self, permission_type: &PermissionType) -> Result<bool, HostError> {
        let guard = self
            .seen
            .lock()
            .map_err(|_| HostError::new("introduction store mutex poisoned"))?;
        Ok(guard.contains(permission_type))
    }

    async fn mark_seen(&self, permission_type: &PermissionType) -> Result<(), HostError> {
        self.seen
            .lock()
            .map_err(|_| HostError::new("introduction store mutex poisoned"))?
            .insert(permission_type.clone());
        Ok(())
    }
}
