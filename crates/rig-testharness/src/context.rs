//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Per-run context handed to every test function."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use indexmap::IndexMap;
use rig_client::{
    BundleProxy, CompletionProbe, ConfigurationProxy, Entity, EventProxy, OperationProxy,
    PendingOperation, ResourceGroupProxy, ResourceProxy, ResourceTypeProxy, Session,
};
use rig_logging::LogContext;

use crate::error::{HarnessError, HarnessResult};
use crate::poller::{Completion, CompletionPoller};

/// Active session, poller and the fixture entities a script's setup
/// registered. One context lives for one run; tests see each other's
/// fixture updates.
#[derive(Debug)]
pub struct TestContext {
    session: Session,
    poller: CompletionPoller,
    script: String,
    current_test: Option<String>,
    fixtures: IndexMap<String, Entity>,
}

impl TestContext {
    pub fn new(session: Session, poller: CompletionPoller, script: impl Into<String>) -> Self {
        Self {
            session,
            poller,
            script: script.into(),
            current_test: None,
            fixtures: IndexMap::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn poller(&self) -> &CompletionPoller {
        &self.poller
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn current_test(&self) -> Option<&str> {
        self.current_test.as_deref()
    }

    pub(crate) fn enter_test(&mut self, name: Option<&str>) {
        self.current_test = name.map(str::to_owned);
    }

    pub fn log_context(&self) -> LogContext<'_> {
        let mut ctx = LogContext::new()
            .with_script(&self.script)
            .with_user(self.session.username());
        if let Some(test) = &self.current_test {
            ctx = ctx.with_test(test);
        }
        ctx
    }

    pub fn resources(&self) -> ResourceProxy {
        self.session.resource_proxy()
    }

    pub fn resource_types(&self) -> ResourceTypeProxy {
        self.session.resource_type_proxy()
    }

    pub fn groups(&self) -> ResourceGroupProxy {
        self.session.resource_group_proxy()
    }

    pub fn configuration(&self) -> ConfigurationProxy {
        self.session.configuration_proxy()
    }

    pub fn operations(&self) -> OperationProxy {
        self.session.operation_proxy()
    }

    pub fn events(&self) -> EventProxy {
        self.session.event_proxy()
    }

    pub fn bundles(&self) -> BundleProxy {
        self.session.bundle_proxy()
    }

    /// Wait for `pending` with the run's poll policy.
    pub async fn await_completion<P>(
        &self,
        probe: &P,
        pending: &PendingOperation,
    ) -> HarnessResult<Completion<P::Settled>>
    where
        P: CompletionProbe + ?Sized,
    {
        self.poller.await_completion(probe, pending).await
    }

    /// Register or replace a fixture entity.
    pub fn set_fixture(&mut self, name: impl Into<String>, entity: Entity) {
        self.fixtures.insert(name.into(), entity);
    }

    pub fn fixture(&self, name: &str) -> HarnessResult<&Entity> {
        self.fixtures
            .get(name)
            .ok_or_else(|| HarnessError::MissingFixture(name.to_owned()))
    }

    pub fn has_fixture(&self, name: &str) -> bool {
        self.fixtures.contains_key(name)
    }

    pub fn fixture_names(&self) -> impl Iterator<Item = &str> {
        self.fixtures.keys().map(String::as_str)
    }
}
