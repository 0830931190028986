// crates/permission-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Fake host services and a stream permission definition.
// Purpose: Provide deterministic collaborators for lifecycle tests.
// Dependencies: permission-gate-core, tokio
// ============================================================================

//! ## Overview
//! [`RecordingHost`] records every surface call and lets tests dismiss a
//! presented surface. [`StreamDefinition`] is a small native-token-stream
//! permission type with one required amount rule, a required expiry rule, and
//! two optional rules. [`Harness`] wires both into an orchestrator.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use permission_gate_core::AccountService;
use permission_gate_core::Address;
use permission_gate_core::Caveat;
use permission_gate_core::ChainId;
use permission_gate_core::Component;
use permission_gate_core::DelegationEnvironment;
use permission_gate_core::DelegationSignature;
use permission_gate_core::DelegationSigner;
use permission_gate_core::EXPIRY_RULE_TYPE;
use permission_gate_core::EventBinding;
use permission_gate_core::HostDialog;
use permission_gate_core::HostError;
use permission_gate_core::InterfaceId;
use permission_gate_core::NonceService;
use permission_gate_core::Permission;
use permission_gate_core::PermissionRequest;
use permission_gate_core::PermissionResult;
use permission_gate_core::PermissionType;
use permission_gate_core::RequestRule;
use permission_gate_core::SignDelegationRequest;
use permission_gate_core::SignerData;
use permission_gate_core::SignerDescriptor;
use permission_gate_core::UserEventKind;
use permission_gate_core::UserInputEvent;
use permission_gate_core::hex_encode;
use permission_gate_core::runtime::ContentInput;
use permission_gate_core::runtime::ContextBuildInput;
use permission_gate_core::runtime::DefinitionError;
use permission_gate_core::runtime::Ed25519DelegationSigner;
use permission_gate_core::runtime::GRANT_BUTTON;
use permission_gate_core::runtime::InMemoryEventDispatcher;
use permission_gate_core::runtime::LifecycleError;
use permission_gate_core::runtime::MemoryAuditSink;
use permission_gate_core::runtime::OrchestratorConfig;
use permission_gate_core::runtime::OrchestratorServices;
use permission_gate_core::runtime::PermissionContext;
use permission_gate_core::runtime::PermissionDefinition;
use permission_gate_core::runtime::PermissionMetadata;
use permission_gate_core::runtime::PermissionRequestHandler;
use permission_gate_core::runtime::PermissionRequestLifecycleOrchestrator;
use permission_gate_core::runtime::RuleData;
use permission_gate_core::runtime::RuleDescriptor;
use permission_gate_core::runtime::RuleFieldType;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Origin used by every test request.
pub const ORIGIN: &str = "https://dapp.example";
/// Permission type of the stream fixture.
pub const STREAM_TYPE: &str = "native-token-stream";
/// Required amount rule.
pub const AMOUNT_RULE: &str = "amountPerSecond";
/// Required expiry rule.
pub const EXPIRY_RULE: &str = "expiry";
/// Optional maximum amount rule.
pub const MAX_AMOUNT_RULE: &str = "maxAmount";
/// Optional start time rule.
pub const START_TIME_RULE: &str = "startTime";
/// Start time filled in when the request leaves it unset.
pub const DEFAULT_START_TIME: u64 = 1_700_000_000;
/// Expiry used by well-formed requests.
pub const EXPIRY: u64 = 1_900_000_000;
/// Secret key of the test signer.
pub const SIGNING_SECRET: [u8; 32] = [7u8; 32];

/// Builds a fixed address from one repeated hex digit.
pub fn address(digit: char) -> Address {
    Address::parse(&format!("0x{}", digit.to_string().repeat(40))).unwrap()
}

/// Delegate (requesting signer) address.
pub fn delegate() -> Address {
    address('1')
}

/// User account address.
pub fn account() -> Address {
    address('2')
}

/// Stream enforcer address.
pub fn stream_enforcer() -> Address {
    address('5')
}

/// Delegation framework addresses.
pub fn environment() -> DelegationEnvironment {
    DelegationEnvironment {
        delegation_manager: address('a'),
        timestamp_enforcer: address('b'),
        nonce_enforcer: address('c'),
    }
}

// ============================================================================
// SECTION: Recording Host
// ============================================================================

/// Lifecycle of a fake surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceStatus {
    /// Presented and waiting.
    Open,
    /// Resolved programmatically.
    Resolved,
    /// Dismissed by the user.
    Dismissed,
}

/// Recorded host state.
#[derive(Default)]
struct HostState {
    /// Next surface number.
    next_id: u64,
    /// Live status channels by surface.
    surfaces: BTreeMap<InterfaceId, watch::Sender<SurfaceStatus>>,
    /// Created surfaces in order.
    created: Vec<InterfaceId>,
    /// Number of update calls.
    updates: usize,
    /// Resolve calls in order.
    resolves: Vec<InterfaceId>,
    /// Latest content sent to any surface.
    last_ui: Option<Component>,
}

/// Host dialog fake that records calls.
#[derive(Default)]
pub struct RecordingHost {
    /// Recorded state.
    state: Mutex<HostState>,
    /// When set, presentation fails immediately.
    fail_present: AtomicBool,
}

impl RecordingHost {
    /// Creates a host whose surfaces stay open until resolved or dismissed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a host whose presentation always fails.
    pub fn failing_presentation() -> Arc<Self> {
        let host = Self::default();
        host.fail_present.store(true, Ordering::SeqCst);
        Arc::new(host)
    }

    /// Simulates the user closing the surface.
    pub fn dismiss(&self, id: &InterfaceId) {
        if let Some(sender) = self.state.lock().unwrap().surfaces.get(id) {
            sender.send_replace(SurfaceStatus::Dismissed);
        }
    }

    /// Number of surfaces created.
    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    /// Number of update calls.
    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    /// Number of resolve calls.
    pub fn resolve_count(&self) -> usize {
        self.state.lock().unwrap().resolves.len()
    }

    /// Most recently created surface.
    pub fn last_id(&self) -> Option<InterfaceId> {
        self.state.lock().unwrap().created.last().cloned()
    }

    /// Latest content sent to the host.
    pub fn last_ui(&self) -> Option<Component> {
        self.state.lock().unwrap().last_ui.clone()
    }
}

#[async_trait]
impl HostDialog for RecordingHost {
    async fn create_surface(&self, ui: &Component) -> Result<InterfaceId, HostError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = InterfaceId::new(format!("surface-{}", state.next_id));
        let (sender, _) = watch::channel(SurfaceStatus::Open);
        state.surfaces.insert(id.clone(), sender);
        state.created.push(id.clone());
        state.last_ui = Some(ui.clone());
        Ok(id)
    }

    async fn update_surface(&self, id: &InterfaceId, ui: &Component) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        if !state.surfaces.contains_key(id) {
            return Err(HostError::new("unknown surface"));
        }
        state.updates += 1;
        state.last_ui = Some(ui.clone());
        Ok(())
    }

    async fn present_surface(&self, id: &InterfaceId) -> Result<Option<Value>, HostError> {
        if self.fail_present.load(Ordering::SeqCst) {
            return Err(HostError::new("presentation failed"));
        }
        let receiver = self.state.lock().unwrap().surfaces.get(id).map(watch::Sender::subscribe);
        let Some(mut receiver) = receiver else {
            return Err(HostError::new("unknown surface"));
        };
        let status = receiver
            .wait_for(|status| *status != SurfaceStatus::Open)
            .await
            .map(|status| *status)
            .map_err(|_| HostError::new("surface dropped"))?;
        Ok(match status {
            SurfaceStatus::Dismissed => None,
            _ => Some(Value::Bool(true)),
        })
    }

    async fn resolve_surface(&self, id: &InterfaceId, _value: Value) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        state.resolves.push(id.clone());
        match state.surfaces.get(id) {
            Some(sender) => {
                sender.send_replace(SurfaceStatus::Resolved);
                Ok(())
            }
            None => Err(HostError::new("unknown surface")),
        }
    }
}

// ============================================================================
// SECTION: Account, Nonce, and Signer Fakes
// ============================================================================

/// Account service fake.
#[derive(Default)]
pub struct FakeAccounts {
    /// Whether the account reports needing an upgrade.
    pub requires_upgrade: bool,
    /// Whether the upgrade fails.
    pub fail_upgrade: bool,
    /// Upgrade attempts.
    pub upgrade_calls: AtomicUsize,
}

#[async_trait]
impl AccountService for FakeAccounts {
    async fn account_addresses(&self) -> Result<Vec<Address>, HostError> {
        Ok(vec![account(), address('3')])
    }

    async fn requires_upgrade(
        &self,
        _chain_id: ChainId,
        _address: &Address,
    ) -> Result<bool, HostError> {
        Ok(self.requires_upgrade)
    }

    async fn upgrade_account(
        &self,
        _chain_id: ChainId,
        _address: &Address,
    ) -> Result<(), HostError> {
        self.upgrade_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upgrade {
            return Err(HostError::new("upgrade rejected"));
        }
        Ok(())
    }
}

/// Nonce service fake that can fail a fixed number of times first.
#[derive(Default)]
pub struct FakeNonces {
    /// Remaining failures.
    pub failures_remaining: AtomicUsize,
    /// Total calls.
    pub calls: AtomicUsize,
}

#[async_trait]
impl NonceService for FakeNonces {
    async fn nonce(&self, _chain_id: ChainId, _account: &Address) -> Result<u128, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HostError::new("nonce service unavailable"));
        }
        Ok(42)
    }
}

/// Signer that counts calls and delegates to an ed25519 key.
pub struct CountingSigner {
    /// Inner signer.
    pub inner: Ed25519DelegationSigner,
    /// Total calls.
    pub calls: AtomicUsize,
}

impl Default for CountingSigner {
    fn default() -> Self {
        Self {
            inner: Ed25519DelegationSigner::from_secret_bytes(&SIGNING_SECRET),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DelegationSigner for CountingSigner {
    async fn sign_delegation(
        &self,
        request: SignDelegationRequest<'_>,
    ) -> Result<DelegationSignature, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_delegation(request).await
    }
}

// ============================================================================
// SECTION: Stream Definition
// ============================================================================

/// Editable terms of a native token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContext {
    /// Justification from the requester.
    pub justification: String,
    /// Whether the user may adjust the terms.
    pub adjustable: bool,
    /// Granting account.
    pub account: Address,
    /// Amount streamed per second.
    pub amount_per_second: Option<String>,
    /// Expiry timestamp in seconds.
    pub expiry: Option<String>,
    /// Optional total cap.
    pub max_amount: Option<String>,
    /// Optional start timestamp.
    pub start_time: Option<String>,
}

impl PermissionContext for StreamContext {
    fn justification(&self) -> &str {
        &self.justification
    }

    fn is_adjustment_allowed(&self) -> bool {
        self.adjustable
    }

    fn account_address(&self) -> &Address {
        &self.account
    }
}

/// Validation state of a stream context.
#[derive(Debug, Clone, Default)]
pub struct StreamMetadata {
    /// Errors by rule name.
    pub errors: BTreeMap<String, String>,
}

impl PermissionMetadata for StreamMetadata {
    fn validation_errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }
}

/// Parses a positive amount given as `0x` hex or decimal.
pub fn parse_amount(value: &str) -> Option<u128> {
    let parsed = match value.strip_prefix("0x") {
        Some(digits) => u128::from_str_radix(digits, 16).ok(),
        None => value.parse::<u128>().ok(),
    };
    parsed.filter(|amount| *amount > 0)
}

/// Native token stream permission type.
#[derive(Debug, Clone, Default)]
pub struct StreamDefinition {
    /// When set, caveat building fails.
    pub fail_caveats: bool,
    /// Amount whose metadata takes [`SLOW_METADATA_DELAY`] to derive.
    pub slow_amount: Option<String>,
}

/// Delay applied when deriving metadata for [`StreamDefinition::slow_amount`].
pub const SLOW_METADATA_DELAY: Duration = Duration::from_secs(5);

/// Adjustable stream context with both required rules set.
pub fn stream_context() -> StreamContext {
    StreamContext {
        justification: "Monthly subscription".to_string(),
        adjustable: true,
        account: account(),
        amount_per_second: Some("0x1".to_string()),
        expiry: Some(EXPIRY.to_string()),
        max_amount: None,
        start_time: None,
    }
}

/// Builds the stream rule descriptors.
pub fn stream_rules() -> Vec<Arc<RuleDescriptor<StreamContext, StreamMetadata>>> {
    vec![
        Arc::new(
            RuleDescriptor::new(
                AMOUNT_RULE,
                "Amount per second",
                RuleFieldType::Number,
                |context: &StreamContext, _: &StreamMetadata| {
                    RuleData::editable(context.amount_per_second.clone())
                },
                |context: &StreamContext, value| StreamContext {
                    amount_per_second: value,
                    ..context.clone()
                },
            )
            .tooltip("Tokens streamed each second"),
        ),
        Arc::new(RuleDescriptor::new(
            EXPIRY_RULE,
            "Expiry",
            RuleFieldType::DateTime,
            |context: &StreamContext, _: &StreamMetadata| {
                RuleData::editable(context.expiry.clone())
            },
            |context: &StreamContext, value| StreamContext {
                expiry: value,
                ..context.clone()
            },
        )),
        Arc::new(
            RuleDescriptor::new(
                MAX_AMOUNT_RULE,
                "Maximum amount",
                RuleFieldType::Number,
                |context: &StreamContext, _: &StreamMetadata| {
                    RuleData::editable(context.max_amount.clone())
                },
                |context: &StreamContext, value| StreamContext {
                    max_amount: value,
                    ..context.clone()
                },
            )
            .optional(),
        ),
        Arc::new(
            RuleDescriptor::new(
                START_TIME_RULE,
                "Start time",
                RuleFieldType::Number,
                |context: &StreamContext, _: &StreamMetadata| {
                    RuleData::editable(context.start_time.clone())
                },
                |context: &StreamContext, value| StreamContext {
                    start_time: value,
                    ..context.clone()
                },
            )
            .optional(),
        ),
    ]
}

/// Validates a stream context.
pub fn stream_metadata(context: &StreamContext) -> StreamMetadata {
    let mut errors = BTreeMap::new();
    match context.amount_per_second.as_deref() {
        Some(amount) if parse_amount(amount).is_some() => {}
        _ => {
            errors.insert(AMOUNT_RULE.to_string(), "must be a positive amount".to_string());
        }
    }
    if let Some(expiry) = context.expiry.as_deref()
        && !expiry.parse::<u64>().is_ok_and(|value| value > 0)
    {
        errors.insert(EXPIRY_RULE.to_string(), "must be a unix timestamp".to_string());
    }
    if let Some(max) = context.max_amount.as_deref()
        && parse_amount(max).is_none()
    {
        errors.insert(MAX_AMOUNT_RULE.to_string(), "must be a positive amount".to_string());
    }
    if let Some(start) = context.start_time.as_deref()
        && start.parse::<u64>().is_err()
    {
        errors.insert(START_TIME_RULE.to_string(), "must be a unix timestamp".to_string());
    }
    StreamMetadata { errors }
}

#[async_trait]
impl PermissionDefinition for StreamDefinition {
    type Context = StreamContext;
    type Metadata = StreamMetadata;

    fn permission_type(&self) -> PermissionType {
        PermissionType::new(STREAM_TYPE)
    }

    fn rules(&self) -> Vec<Arc<RuleDescriptor<StreamContext, StreamMetadata>>> {
        stream_rules()
    }

    async fn validate_request(
        &self,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, DefinitionError> {
        if request.permission.data.get(AMOUNT_RULE).and_then(Value::as_str).is_none() {
            return Err(DefinitionError::Validation("amountPerSecond is required".to_string()));
        }
        Ok(request.clone())
    }

    async fn build_context(
        &self,
        input: ContextBuildInput<'_>,
    ) -> Result<StreamContext, DefinitionError> {
        let data = &input.request.permission.data;
        let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        let account = input
            .request
            .address
            .clone()
            .or_else(|| input.accounts.first().cloned())
            .ok_or_else(|| DefinitionError::Validation("no account available".to_string()))?;
        Ok(StreamContext {
            justification: text("justification").unwrap_or_default(),
            adjustable: input.request.permission.is_adjustment_allowed,
            account,
            amount_per_second: text(AMOUNT_RULE),
            expiry: input.request.expiry().map(|expiry| expiry.to_string()),
            max_amount: text(MAX_AMOUNT_RULE),
            start_time: data.get(START_TIME_RULE).and_then(Value::as_u64).map(|v| v.to_string()),
        })
    }

    async fn derive_metadata(
        &self,
        context: &StreamContext,
    ) -> Result<StreamMetadata, DefinitionError> {
        if self.slow_amount.is_some() && context.amount_per_second == self.slow_amount {
            tokio::time::sleep(SLOW_METADATA_DELAY).await;
        }
        Ok(stream_metadata(context))
    }

    fn create_confirmation_content(
        &self,
        input: ContentInput<'_, StreamContext, StreamMetadata>,
    ) -> Result<Component, DefinitionError> {
        Ok(Component::container(vec![
            Component::heading("Native token stream"),
            Component::text(input.context.justification.clone()),
        ]))
    }

    async fn apply_context(
        &self,
        context: &StreamContext,
        request: &PermissionRequest,
    ) -> Result<PermissionRequest, DefinitionError> {
        let mut data = Map::new();
        if let Some(amount) = &context.amount_per_second {
            data.insert(AMOUNT_RULE.to_string(), Value::String(amount.clone()));
        }
        if let Some(max) = &context.max_amount {
            data.insert(MAX_AMOUNT_RULE.to_string(), Value::String(max.clone()));
        }
        if let Some(start) = context.start_time.as_deref().and_then(|v| v.parse::<u64>().ok()) {
            data.insert(START_TIME_RULE.to_string(), json!(start));
        }
        data.insert("justification".to_string(), Value::String(context.justification.clone()));
        let mut next = request.clone();
        next.address = Some(context.account.clone());
        next.permission.data = Value::Object(data);
        let expiry = context.expiry.as_deref().and_then(|v| v.parse::<u64>().ok());
        Ok(match expiry {
            Some(expiry) => next.with_rule(RequestRule::expiry(expiry, context.adjustable)),
            None => next.without_rule(EXPIRY_RULE_TYPE),
        })
    }

    async fn populate_permission(
        &self,
        permission: &Permission,
    ) -> Result<Permission, DefinitionError> {
        let mut populated = permission.clone();
        if let Value::Object(data) = &mut populated.data {
            data.entry(START_TIME_RULE.to_string()).or_insert_with(|| json!(DEFAULT_START_TIME));
        }
        Ok(populated)
    }

    async fn create_permission_caveats(
        &self,
        permission: &Permission,
        _chain_id: ChainId,
        _environment: &DelegationEnvironment,
    ) -> Result<Vec<Caveat>, DefinitionError> {
        if self.fail_caveats {
            return Err(DefinitionError::Host(HostError::new("caveat builder unavailable")));
        }
        let amount = permission
            .data
            .get(AMOUNT_RULE)
            .and_then(Value::as_str)
            .and_then(parse_amount)
            .ok_or_else(|| DefinitionError::Validation("amountPerSecond is invalid".to_string()))?;
        Ok(vec![Caveat::new(stream_enforcer(), hex_encode(&amount.to_be_bytes()))])
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Builds a stream request.
pub fn stream_request(chain_id: &str, expiry: Option<u64>) -> PermissionRequest {
    PermissionRequest {
        chain_id: chain_id.to_string(),
        address: None,
        signer: SignerDescriptor {
            kind: "account".to_string(),
            data: SignerData {
                address: delegate(),
            },
        },
        permission: Permission {
            permission_type: PermissionType::new(STREAM_TYPE),
            data: json!({ "amountPerSecond": "0x1", "justification": "Monthly subscription" }),
            is_adjustment_allowed: true,
        },
        rules: expiry.map(|expiry| vec![RequestRule::expiry(expiry, true)]),
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Harness knobs.
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Confirmation timeout.
    pub timeout: Duration,
    /// Whether the account requires an upgrade.
    pub requires_upgrade: bool,
    /// Whether the upgrade fails.
    pub fail_upgrade: bool,
    /// Number of leading nonce failures.
    pub nonce_failures: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3_600),
            requires_upgrade: false,
            fail_upgrade: false,
            nonce_failures: 0,
        }
    }
}

/// Orchestrator wired to recording fakes.
pub struct Harness {
    /// Host dialog fake.
    pub host: Arc<RecordingHost>,
    /// Dispatcher.
    pub dispatcher: InMemoryEventDispatcher,
    /// Account fake.
    pub accounts: Arc<FakeAccounts>,
    /// Nonce fake.
    pub nonces: Arc<FakeNonces>,
    /// Signer.
    pub signer: Arc<CountingSigner>,
    /// Audit sink.
    pub audit: Arc<MemoryAuditSink>,
    /// Orchestrator.
    pub orchestrator: Arc<PermissionRequestLifecycleOrchestrator>,
}

impl Harness {
    /// Builds a harness with default options.
    pub fn new() -> Self {
        Self::build(HarnessOptions::default())
    }

    /// Builds a harness.
    pub fn build(options: HarnessOptions) -> Self {
        let host = RecordingHost::new();
        let dispatcher = InMemoryEventDispatcher::new();
        let accounts = Arc::new(FakeAccounts {
            requires_upgrade: options.requires_upgrade,
            fail_upgrade: options.fail_upgrade,
            upgrade_calls: AtomicUsize::new(0),
        });
        let nonces = Arc::new(FakeNonces {
            failures_remaining: AtomicUsize::new(options.nonce_failures),
            calls: AtomicUsize::new(0),
        });
        let signer = Arc::new(CountingSigner::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let services = OrchestratorServices {
            host: host.clone(),
            dispatcher: Arc::new(dispatcher.clone()),
            accounts: accounts.clone(),
            signer: signer.clone(),
            nonces: nonces.clone(),
            audit: audit.clone(),
        };
        let mut config =
            OrchestratorConfig::new([ChainId::new(1), ChainId::new(11_155_111)], environment());
        config.confirmation_timeout = options.timeout;
        let orchestrator = Arc::new(PermissionRequestLifecycleOrchestrator::new(services, config));
        Self {
            host,
            dispatcher,
            accounts,
            nonces,
            signer,
            audit,
            orchestrator,
        }
    }

    /// Signer call count.
    pub fn sign_calls(&self) -> usize {
        self.signer.calls.load(Ordering::SeqCst)
    }

    /// Waits until the newest surface has a bound Grant button and returns its id.
    pub async fn wait_for_decision(&self) -> InterfaceId {
        let ready = eventually(|| {
            self.host.last_id().is_some_and(|id| {
                self.dispatcher.is_bound(&EventBinding::new(
                    GRANT_BUTTON,
                    UserEventKind::ButtonClick,
                    id,
                ))
            })
        })
        .await;
        assert!(ready, "confirmation never reached the decision phase");
        self.host.last_id().unwrap()
    }

    /// Clicks a button and waits for its handlers.
    pub async fn click(&self, id: &InterfaceId, name: &str) -> usize {
        let started = click(&self.dispatcher, id, name);
        settle(&self.dispatcher).await;
        started
    }

    /// Types into a field and waits for its handlers.
    pub async fn input(&self, id: &InterfaceId, name: &str, value: &str) -> usize {
        let started = input(&self.dispatcher, id, name, value);
        settle(&self.dispatcher).await;
        started
    }
}

/// Runs a request on a background task.
pub fn spawn_request(
    handler: Arc<dyn PermissionRequestHandler>,
    request: PermissionRequest,
) -> JoinHandle<Result<PermissionResult, LifecycleError>> {
    tokio::spawn(async move { handler.handle_permission_request(ORIGIN, &request).await })
}

// ============================================================================
// SECTION: Event Helpers
// ============================================================================

/// Emits a button click.
pub fn click(dispatcher: &InMemoryEventDispatcher, id: &InterfaceId, name: &str) -> usize {
    dispatcher.emit(UserInputEvent {
        element_name: name.to_string(),
        event_kind: UserEventKind::ButtonClick,
        interface_id: id.clone(),
        value: None,
    })
}

/// Emits an input change.
pub fn input(
    dispatcher: &InMemoryEventDispatcher,
    id: &InterfaceId,
    name: &str,
    value: &str,
) -> usize {
    dispatcher.emit(UserInputEvent {
        element_name: name.to_string(),
        event_kind: UserEventKind::InputChange,
        interface_id: id.clone(),
        value: Some(Value::String(value.to_string())),
    })
}

/// Waits for every spawned handler, then lets follow-up tasks run.
pub async fn settle(dispatcher: &InMemoryEventDispatcher) {
    use permission_gate_core::EventDispatcher;
    dispatcher.wait_for_pending_handlers().await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Yields until `condition` holds or the attempt budget runs out.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..10_000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
