//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Manager proxy trait, capability descriptors and shared helpers."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
//! Per-domain manager proxies.
//!
//! Every proxy is bound to a [`Session`] and issues its calls with that
//! session's token. The shared surface lives in [`ManagerProxy`]; the
//! domain operations are inherent methods on each proxy type.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::criteria::{CriteriaQuery, QueryCriteria};
use crate::error::{ClientError, ClientResult};
use crate::model::{Entity, EntityId, EntityKind};
use crate::pending::{Mutation, PendingOperation};
use crate::remote::UpdateReceipt;
use crate::session::Session;

mod bundle;
mod configuration;
mod event;
mod group;
mod operation;
mod resource;

pub use bundle::BundleProxy;
pub use configuration::ConfigurationProxy;
pub use event::EventProxy;
pub use group::ResourceGroupProxy;
pub use operation::OperationProxy;
pub use resource::{ResourceProxy, ResourceTypeProxy};

/// How a proxy treats deletion of an entity that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Succeeds with [`DeleteOutcome::AlreadyAbsent`].
    Idempotent,
    /// Fails with [`ClientError::NotFound`].
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    Sync,
    Async,
}

/// One mutating operation and whether it completes synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSpec {
    pub operation: &'static str,
    pub mode: MutationMode,
}

impl MutationSpec {
    pub const fn sync(operation: &'static str) -> Self {
        Self {
            operation,
            mode: MutationMode::Sync,
        }
    }

    pub const fn asynchronous(operation: &'static str) -> Self {
        Self {
            operation,
            mode: MutationMode::Async,
        }
    }
}

/// Static description of what a proxy supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyCapabilities {
    /// Kinds this proxy can query. The first one is the primary kind.
    pub kinds: &'static [EntityKind],
    pub delete_policy: Option<DeletePolicy>,
    pub mutations: &'static [MutationSpec],
}

impl ProxyCapabilities {
    pub fn primary_kind(&self) -> EntityKind {
        self.kinds[0]
    }

    pub fn queries(&self, kind: EntityKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn supports_delete(&self) -> bool {
        self.delete_policy.is_some()
    }

    /// Whether any mutation of this proxy completes asynchronously.
    pub fn is_async(&self) -> bool {
        self.mutations
            .iter()
            .any(|spec| spec.mode == MutationMode::Async)
    }

    pub fn mode_of(&self, operation: &str) -> Option<MutationMode> {
        self.mutations
            .iter()
            .find(|spec| spec.operation == operation)
            .map(|spec| spec.mode)
    }
}

/// Outcome of a delete under [`DeletePolicy::Idempotent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Surface shared by every manager proxy.
#[async_trait]
pub trait ManagerProxy: Send + Sync {
    fn session(&self) -> &Session;

    fn capabilities(&self) -> ProxyCapabilities;

    /// Fresh criteria builder for the primary kind.
    fn criteria(&self) -> QueryCriteria {
        QueryCriteria::new(self.capabilities().primary_kind())
    }

    /// Fresh criteria builder for any kind this proxy queries.
    fn criteria_for(&self, kind: EntityKind) -> ClientResult<QueryCriteria> {
        if !self.capabilities().queries(kind) {
            return Err(ClientError::Validation(format!(
                "{kind} is not queried through this proxy"
            )));
        }
        Ok(QueryCriteria::new(kind))
    }

    /// Run a query. An empty result is not an error.
    async fn find_by_criteria(&self, query: CriteriaQuery) -> ClientResult<Vec<Entity>> {
        let kind = query.kind();
        if !self.capabilities().queries(kind) {
            return Err(ClientError::Validation(format!(
                "{kind} is not queried through this proxy"
            )));
        }
        let found = self
            .session()
            .call("find", |server, token| async move {
                server.find(&token, &query).await
            })
            .await?;
        debug!(kind = %kind, matches = found.len(), "criteria query");
        Ok(found)
    }

    /// Fetch one entity by id.
    async fn get_by_id(&self, kind: EntityKind, id: EntityId) -> ClientResult<Entity> {
        let mut criteria = self.criteria_for(kind)?;
        criteria.filter_id(id)?;
        self.find_by_criteria(criteria.build())
            .await?
            .into_iter()
            .next()
            .ok_or(ClientError::NotFound { kind, id })
    }

    /// Delete one entity under the delete policy this proxy publishes.
    async fn delete_entity(&self, kind: EntityKind, id: EntityId) -> ClientResult<DeleteOutcome> {
        let capabilities = self.capabilities();
        let policy = match capabilities.delete_policy {
            Some(policy) if capabilities.queries(kind) => policy,
            _ => {
                return Err(ClientError::Validation(format!(
                    "{kind} records are not deleted through this proxy"
                )))
            }
        };
        delete_with_policy(self.session(), policy, kind, id).await
    }
}

impl Session {
    pub fn resource_proxy(&self) -> ResourceProxy {
        ResourceProxy::new(self.clone())
    }

    pub fn resource_type_proxy(&self) -> ResourceTypeProxy {
        ResourceTypeProxy::new(self.clone())
    }

    pub fn resource_group_proxy(&self) -> ResourceGroupProxy {
        ResourceGroupProxy::new(self.clone())
    }

    pub fn configuration_proxy(&self) -> ConfigurationProxy {
        ConfigurationProxy::new(self.clone())
    }

    pub fn operation_proxy(&self) -> OperationProxy {
        OperationProxy::new(self.clone())
    }

    pub fn event_proxy(&self) -> EventProxy {
        EventProxy::new(self.clone())
    }

    pub fn bundle_proxy(&self) -> BundleProxy {
        BundleProxy::new(self.clone())
    }
}

async fn delete_with_policy(
    session: &Session,
    policy: DeletePolicy,
    kind: EntityKind,
    id: EntityId,
) -> ClientResult<DeleteOutcome> {
    let result = session
        .call("delete", move |server, token| async move {
            server.delete(&token, kind, id).await
        })
        .await;
    match (result, policy) {
        (Ok(()), _) => {
            info!(entity = %format!("{kind}:{id}"), "entity deleted");
            Ok(DeleteOutcome::Deleted)
        }
        (Err(ClientError::NotFound { .. }), DeletePolicy::Idempotent) => {
            debug!(entity = %format!("{kind}:{id}"), "delete of absent entity");
            Ok(DeleteOutcome::AlreadyAbsent)
        }
        (Err(err), _) => Err(err),
    }
}

/// Turn a server receipt into a [`Mutation`], reading the applied value with
/// `applied` when the server finished synchronously.
pub(crate) fn receipt_to_mutation<T>(
    receipt: UpdateReceipt,
    applied: impl FnOnce(Option<Entity>) -> ClientResult<T>,
) -> ClientResult<Mutation<T>> {
    match receipt {
        UpdateReceipt::Applied { entity } => applied(entity).map(Mutation::Applied),
        UpdateReceipt::Pending {
            target,
            submitted_at,
        } => {
            debug!(target = %target, "mutation pending");
            Ok(Mutation::Pending(PendingOperation::new(target, submitted_at)))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::error::{RemoteError, RemoteResult};
    use crate::model::{Configuration, FileReference};
    use crate::remote::{
        AuthToken, ConfigurationScope, ContentUpload, EntityDraft, OperationDomain,
        OperationStatus, OperationTarget, RemoteServer, UpdateRequest,
    };
    use crate::session::Credentials;

    /// Server with nothing to delete that applies plugin configuration at
    /// once and holds resource configuration until `finish` is called.
    #[derive(Default)]
    pub(crate) struct StubServer {
        pub(crate) configs: Mutex<HashMap<(EntityId, ConfigurationScope), Configuration>>,
        pub(crate) held: Mutex<HashMap<EntityId, Configuration>>,
        pub(crate) deletes: AtomicUsize,
    }

    impl StubServer {
        pub(crate) fn seed(&self, resource: EntityId, scope: ConfigurationScope, config: Configuration) {
            self.configs.lock().insert((resource, scope), config);
        }

        pub(crate) fn finish(&self, resource: EntityId) {
            if let Some(config) = self.held.lock().remove(&resource) {
                self.seed(resource, ConfigurationScope::Resource, config);
            }
        }
    }

    #[async_trait]
    impl RemoteServer for StubServer {
        fn describe(&self) -> String {
            "memory://stub".into()
        }

        async fn authenticate(&self, _: &str, _: &str) -> RemoteResult<AuthToken> {
            Ok(AuthToken::new("stub-token"))
        }

        async fn invalidate(&self, _: &AuthToken) -> RemoteResult<()> {
            Ok(())
        }

        async fn find(&self, _: &AuthToken, _: &CriteriaQuery) -> RemoteResult<Vec<Entity>> {
            Ok(Vec::new())
        }

        async fn create(&self, _: &AuthToken, _: &EntityDraft) -> RemoteResult<Entity> {
            Err(RemoteError::Internal("unsupported".into()))
        }

        async fn update(&self, _: &AuthToken, request: &UpdateRequest) -> RemoteResult<UpdateReceipt> {
            match request {
                UpdateRequest::Configuration {
                    resource_id,
                    scope: ConfigurationScope::Plugin,
                    configuration,
                } => {
                    self.seed(*resource_id, ConfigurationScope::Plugin, configuration.clone());
                    Ok(UpdateReceipt::Applied { entity: None })
                }
                UpdateRequest::Configuration {
                    resource_id,
                    scope: ConfigurationScope::Resource,
                    configuration,
                } => {
                    self.held.lock().insert(*resource_id, configuration.clone());
                    Ok(UpdateReceipt::Pending {
                        target: OperationTarget::new(
                            OperationDomain::ResourceConfiguration,
                            *resource_id,
                        ),
                        submitted_at: Utc::now(),
                    })
                }
                _ => Err(RemoteError::Internal("unsupported".into())),
            }
        }

        async fn delete(&self, _: &AuthToken, kind: EntityKind, id: EntityId) -> RemoteResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::NotFound { kind, id })
        }

        async fn fetch_configuration(
            &self,
            _: &AuthToken,
            resource_id: EntityId,
            scope: ConfigurationScope,
        ) -> RemoteResult<Configuration> {
            self.configs
                .lock()
                .get(&(resource_id, scope))
                .cloned()
                .ok_or(RemoteError::NotFound {
                    kind: EntityKind::Resource,
                    id: resource_id,
                })
        }

        async fn operation_status(
            &self,
            _: &AuthToken,
            target: OperationTarget,
        ) -> RemoteResult<OperationStatus> {
            if self.held.lock().contains_key(&target.entity_id) {
                Ok(OperationStatus::InProgress)
            } else {
                Ok(OperationStatus::Succeeded)
            }
        }

        async fn upload(&self, _: &AuthToken, _: &ContentUpload) -> RemoteResult<FileReference> {
            Err(RemoteError::Internal("unsupported".into()))
        }
    }

    pub(crate) async fn stub_session() -> (Arc<StubServer>, Session) {
        let server = Arc::new(StubServer::default());
        let session = Session::login(server.clone(), Credentials::new("rigadmin", "rigadmin"))
            .await
            .unwrap();
        (server, session)
    }

    const CAPS: ProxyCapabilities = ProxyCapabilities {
        kinds: &[EntityKind::ConfigurationUpdate],
        delete_policy: None,
        mutations: &[
            MutationSpec::asynchronous("update_resource_configuration"),
            MutationSpec::sync("update_plugin_configuration"),
        ],
    };

    #[test]
    fn capabilities_report_mutation_modes() {
        assert!(CAPS.is_async());
        assert!(!CAPS.supports_delete());
        assert_eq!(
            CAPS.mode_of("update_plugin_configuration"),
            Some(MutationMode::Sync)
        );
        assert_eq!(CAPS.mode_of("delete"), None);
    }

    #[test]
    fn applied_receipt_without_entity_is_passed_through() {
        let mutation = receipt_to_mutation(UpdateReceipt::Applied { entity: None }, |entity| {
            Ok(entity.is_none())
        })
        .unwrap();
        assert_eq!(mutation, Mutation::Applied(true));
    }

    #[tokio::test]
    async fn deletes_follow_the_published_policy() {
        let (server, session) = stub_session().await;
        let missing = EntityId(404);

        let events = session.event_proxy();
        assert_eq!(events.capabilities().delete_policy, Some(DeletePolicy::Idempotent));
        assert_eq!(
            events.delete_event(missing).await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );

        let resources = session.resource_proxy();
        assert_eq!(resources.capabilities().delete_policy, Some(DeletePolicy::Strict));
        let err = resources.uninventory_resource(missing).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::NotFound {
                kind: EntityKind::Resource,
                id: missing
            }
        );
        assert_eq!(server.deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_is_refused_without_a_policy_or_for_foreign_kinds() {
        let (server, session) = stub_session().await;
        let configuration = session.configuration_proxy();
        let err = configuration
            .delete_entity(EntityKind::ConfigurationUpdate, EntityId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let err = session
            .event_proxy()
            .delete_entity(EntityKind::Resource, EntityId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(server.deletes.load(Ordering::SeqCst), 0);
    }
}
