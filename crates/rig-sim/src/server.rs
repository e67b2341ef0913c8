//! ---
//! rig_section: "11-simulation"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Simulated server facade: accounts, tokens, fault injection and call accounting."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rig_client::remote::rpc;
use rig_client::{
    AuthToken, Configuration, ConfigurationScope, ContentUpload, CriteriaQuery, Entity,
    EntityDraft, EntityId, EntityKind, FileReference, OperationDomain, OperationStatus,
    OperationTarget, RemoteError, RemoteResult, RemoteServer, UpdateReceipt, UpdateRequest,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::inventory::InventorySeed;
use crate::state::{Fault, SimState};

/// Options for a [`SimulatedServer`].
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Time between submitting an asynchronous mutation and its completion.
    pub completion_delay: Duration,
    /// Accepted `(username, password)` pairs.
    pub accounts: Vec<(String, String)>,
    pub seed: InventorySeed,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            completion_delay: Duration::from_millis(50),
            accounts: vec![("rigadmin".to_owned(), "rigadmin".to_owned())],
            seed: InventorySeed::default(),
        }
    }
}

impl SimOptions {
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }
}

/// In-memory implementation of [`RemoteServer`].
///
/// Asynchronous mutations complete lazily: every incoming call first
/// completes the jobs whose delay has elapsed. Faults can stall or fail
/// whole domains, take the server offline, or fail the next call of a
/// given route.
pub struct SimulatedServer {
    state: RwLock<SimState>,
    accounts: HashMap<String, String>,
    tokens: RwLock<HashMap<String, String>>,
    offline: AtomicBool,
    injected: Mutex<HashMap<&'static str, RemoteError>>,
    calls: Mutex<HashMap<&'static str, u64>>,
}

impl std::fmt::Debug for SimulatedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedServer")
            .field("sessions", &self.tokens.read().len())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new(SimOptions::default())
    }
}

impl SimulatedServer {
    pub fn new(options: SimOptions) -> Self {
        let mut state = SimState::new(options.completion_delay);
        options.seed.apply(&mut state);
        info!(
            completion_delay_ms = options.completion_delay.as_millis() as u64,
            "simulated server seeded"
        );
        Self {
            state: RwLock::new(state),
            accounts: options.accounts.into_iter().collect(),
            tokens: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            injected: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Stall every job of `domain` until [`Self::clear_fault`].
    pub fn stall(&self, domain: OperationDomain) {
        self.state.write().set_fault(domain, Fault::Stall);
    }

    /// Make every job of `domain` fail with `message`.
    pub fn fail_operations(&self, domain: OperationDomain, message: impl Into<String>) {
        self.state
            .write()
            .set_fault(domain, Fault::Fail(message.into()));
    }

    pub fn clear_fault(&self, domain: OperationDomain) {
        self.state.write().clear_fault(domain);
    }

    /// Fail the next call to route `call` (see [`rpc`]) with `error`.
    pub fn fail_next_call(&self, call: &'static str, error: RemoteError) {
        self.injected.lock().insert(call, error);
    }

    /// Reject every call with [`RemoteError::Unavailable`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Invalidate every issued token, as a server restart would.
    pub fn expire_sessions(&self) {
        let mut tokens = self.tokens.write();
        info!(sessions = tokens.len(), "simulated sessions expired");
        tokens.clear();
    }

    pub fn active_sessions(&self) -> usize {
        self.tokens.read().len()
    }

    /// Number of calls received on route `call`.
    pub fn call_count(&self, call: &str) -> u64 {
        self.calls.lock().get(call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.lock().values().sum()
    }

    pub fn pending_jobs(&self) -> usize {
        self.state.read().pending_jobs()
    }

    /// Configuration stored with a bundle deploy definition.
    pub fn deploy_configuration(&self, definition: EntityId) -> Option<Configuration> {
        self.state.read().deploy_configuration(definition).cloned()
    }

    /// Files uploaded into a bundle version.
    pub fn files_of(&self, bundle_version_id: EntityId) -> Vec<FileReference> {
        self.state.read().files_of(bundle_version_id)
    }

    /// Count the call, apply injected faults and complete elapsed jobs.
    fn enter(&self, call: &'static str) -> RemoteResult<()> {
        *self.calls.lock().entry(call).or_insert(0) += 1;
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("simulated server is offline".into()));
        }
        if let Some(err) = self.injected.lock().remove(call) {
            debug!(call, error = %err, "injected failure");
            return Err(err);
        }
        self.state.write().advance(Instant::now());
        Ok(())
    }

    fn authorize(&self, call: &'static str, token: &AuthToken) -> RemoteResult<String> {
        self.enter(call)?;
        self.tokens
            .read()
            .get(token.as_str())
            .cloned()
            .ok_or(RemoteError::InvalidToken)
    }
}

#[async_trait]
impl RemoteServer for SimulatedServer {
    fn describe(&self) -> String {
        "sim://in-memory".to_owned()
    }

    async fn authenticate(&self, username: &str, password: &str) -> RemoteResult<AuthToken> {
        self.enter(rpc::AUTHENTICATE)?;
        match self.accounts.get(username) {
            Some(expected) if expected == password => {
                let token = Uuid::new_v4().to_string();
                self.tokens
                    .write()
                    .insert(token.clone(), username.to_owned());
                debug!(user = username, "simulated login");
                Ok(AuthToken::new(token))
            }
            _ => Err(RemoteError::Unauthenticated(format!(
                "invalid credentials for '{username}'"
            ))),
        }
    }

    async fn invalidate(&self, token: &AuthToken) -> RemoteResult<()> {
        self.authorize(rpc::INVALIDATE, token)?;
        self.tokens.write().remove(token.as_str());
        Ok(())
    }

    async fn find(&self, token: &AuthToken, query: &CriteriaQuery) -> RemoteResult<Vec<Entity>> {
        self.authorize(rpc::FIND, token)?;
        self.state.read().find(query)
    }

    async fn create(&self, token: &AuthToken, draft: &EntityDraft) -> RemoteResult<Entity> {
        self.authorize(rpc::CREATE, token)?;
        self.state.write().create(draft)
    }

    async fn update(
        &self,
        token: &AuthToken,
        request: &UpdateRequest,
    ) -> RemoteResult<UpdateReceipt> {
        self.authorize(rpc::UPDATE, token)?;
        self.state
            .write()
            .update(request, Instant::now(), Utc::now())
    }

    async fn delete(&self, token: &AuthToken, kind: EntityKind, id: EntityId) -> RemoteResult<()> {
        self.authorize(rpc::DELETE, token)?;
        self.state.write().delete(kind, id)
    }

    async fn fetch_configuration(
        &self,
        token: &AuthToken,
        resource_id: EntityId,
        scope: ConfigurationScope,
    ) -> RemoteResult<Configuration> {
        self.authorize(rpc::FETCH_CONFIGURATION, token)?;
        self.state.read().fetch_configuration(resource_id, scope)
    }

    async fn operation_status(
        &self,
        token: &AuthToken,
        target: OperationTarget,
    ) -> RemoteResult<OperationStatus> {
        self.authorize(rpc::OPERATION_STATUS, token)?;
        self.state.read().status(target)
    }

    async fn upload(
        &self,
        token: &AuthToken,
        upload: &ContentUpload,
    ) -> RemoteResult<FileReference> {
        self.authorize(rpc::UPLOAD, token)?;
        self.state.write().upload(upload)
    }
}
