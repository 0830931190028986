// crates/permission-gate-config/src/lib.rs
// ============================================================================
// Module: Permission Gate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for permission-gate.toml semantics.
// Dependencies: permission-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! `permission-gate-config` defines the configuration model for Permission
//! Gate. It validates fail-closed and converts into the core's
//! [`permission_gate_core::OrchestratorConfig`] and audit sink.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
