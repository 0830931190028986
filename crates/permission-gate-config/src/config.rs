// crates/permission-gate-config/src/config.rs
// ============================================================================
// Module: Permission Gate Configuration
// Description: Configuration loading and validation for Permission Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: permission-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: a gate that cannot tell which
//! chains it serves or which enforcers bind its caveats must not sign anything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use permission_gate_core::Address;
use permission_gate_core::ChainId;
use permission_gate_core::DelegationEnvironment;
use permission_gate_core::OrchestratorConfig;
use permission_gate_core::runtime::AuditSink;
use permission_gate_core::runtime::FileAuditSink;
use permission_gate_core::runtime::NoopAuditSink;
use permission_gate_core::runtime::StderrAuditSink;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "permission-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PERMISSION_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default confirmation timeout in milliseconds (one hour).
pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 60 * 60 * 1000;
/// Minimum confirmation timeout in milliseconds.
pub(crate) const MIN_TIMEOUT_MS: u64 = 1_000;
/// Maximum confirmation timeout in milliseconds (24 hours).
pub(crate) const MAX_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;
/// Maximum number of supported chains.
pub(crate) const MAX_SUPPORTED_CHAINS: usize = 256;
/// Chains served when the config does not list any.
const DEFAULT_SUPPORTED_CHAINS: [u64; 6] = [1, 10, 137, 8_453, 42_161, 11_155_111];

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level Permission Gate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionGateConfig {
    /// Confirmation dialog configuration.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Supported chain configuration.
    #[serde(default)]
    pub chains: ChainsConfig,
    /// Delegation framework contract addresses.
    pub delegation: DelegationConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl PermissionGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// `permission-gate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.confirmation.validate()?;
        self.chains.validate()?;
        self.delegation.validate()?;
        self.audit.validate()
    }

    /// Converts the configuration into the orchestrator's runtime config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a delegation address is malformed.
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        let environment = self.delegation.environment()?;
        let mut config = OrchestratorConfig::new(self.chains.chain_ids(), environment);
        config.confirmation_timeout = self.confirmation.timeout();
        Ok(config)
    }

    /// Instantiates the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file sink cannot be opened.
    pub fn build_audit_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        self.audit.build_sink()
    }
}

// ============================================================================
// SECTION: Confirmation
// ============================================================================

/// Confirmation dialog configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// Time the user has to decide, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ConfirmationConfig {
    /// Returns the confirmation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates timeout bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "confirmation.timeout_ms must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Default confirmation timeout in milliseconds.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Chains
// ============================================================================

/// Supported chain configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainsConfig {
    /// Numeric chain ids the gate serves.
    #[serde(default = "default_supported_chains")]
    pub supported: Vec<u64>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            supported: default_supported_chains(),
        }
    }
}

impl ChainsConfig {
    /// Returns the configured chain ids.
    #[must_use]
    pub fn chain_ids(&self) -> BTreeSet<ChainId> {
        self.supported.iter().copied().map(ChainId::new).collect()
    }

    /// Validates the chain list.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.supported.is_empty() {
            return Err(ConfigError::Invalid("chains.supported must be non-empty".to_string()));
        }
        if self.supported.len() > MAX_SUPPORTED_CHAINS {
            return Err(ConfigError::Invalid(format!(
                "chains.supported exceeds {MAX_SUPPORTED_CHAINS} entries"
            )));
        }
        let mut seen = BTreeSet::new();
        for chain in &self.supported {
            if *chain == 0 {
                return Err(ConfigError::Invalid("chains.supported must not contain 0".to_string()));
            }
            if !seen.insert(*chain) {
                return Err(ConfigError::Invalid(format!(
                    "chains.supported contains duplicate chain {chain}"
                )));
            }
        }
        Ok(())
    }
}

/// Default supported chain ids.
fn default_supported_chains() -> Vec<u64> {
    DEFAULT_SUPPORTED_CHAINS.to_vec()
}

// ============================================================================
// SECTION: Delegation
// ============================================================================

/// Delegation framework contract addresses.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelegationConfig {
    /// Delegation manager contract.
    pub delegation_manager: String,
    /// Timestamp enforcer contract.
    pub timestamp_enforcer: String,
    /// Nonce enforcer contract.
    pub nonce_enforcer: String,
}

impl DelegationConfig {
    /// Parses the addresses into a delegation environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an address is malformed.
    pub fn environment(&self) -> Result<DelegationEnvironment, ConfigError> {
        Ok(DelegationEnvironment {
            delegation_manager: parse_address(
                "delegation.delegation_manager",
                &self.delegation_manager,
            )?,
            timestamp_enforcer: parse_address(
                "delegation.timestamp_enforcer",
                &self.timestamp_enforcer,
            )?,
            nonce_enforcer: parse_address("delegation.nonce_enforcer", &self.nonce_enforcer)?,
        })
    }

    /// Validates every address.
    fn validate(&self) -> Result<(), ConfigError> {
        self.environment().map(|_| ())
    }
}

/// Parses one configured address.
fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    Address::parse(value.trim())
        .map_err(|_| ConfigError::Invalid(format!("{field} must be a 0x-prefixed 20-byte address")))
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path (required for the file sink).
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
            (_, Some(path)) => validate_path_string("audit.path", path),
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured sink.
    fn build_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match self.sink {
            AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkKind::File => {
                let path = self.path.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("audit.path is required for the file sink".to_string())
                })?;
                let sink = FileAuditSink::new(Path::new(path.trim()))
                    .map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    validate_path(Path::new(trimmed))
        .map_err(|_| ConfigError::Invalid(format!("{field} exceeds path limits")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
