//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Resource and plugin configuration proxy."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;
use tracing::info;

use super::{receipt_to_mutation, ManagerProxy, MutationSpec, ProxyCapabilities};
use crate::criteria::CriteriaQuery;
use crate::error::{ClientError, ClientResult};
use crate::model::{Configuration, Entity, EntityId, EntityKind};
use crate::pending::{CompletionProbe, Mutation};
use crate::remote::{
    ConfigurationScope, OperationDomain, OperationStatus, OperationTarget, UpdateRequest,
};
use crate::session::Session;

const CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::ConfigurationUpdate],
    delete_policy: None,
    mutations: &[
        MutationSpec::asynchronous("update_resource_configuration"),
        MutationSpec::sync("update_plugin_configuration"),
    ],
};

/// Reads and updates resource settings.
///
/// Resource configuration updates are pushed to the managing agent and
/// complete asynchronously; the returned [`Mutation::Pending`] targets the
/// resource. Plugin configuration updates are applied immediately.
#[derive(Debug, Clone)]
pub struct ConfigurationProxy {
    session: Session,
}

impl ConfigurationProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn fetch(
        &self,
        resource_id: EntityId,
        scope: ConfigurationScope,
    ) -> ClientResult<Configuration> {
        self.session
            .call("fetch_configuration", move |server, token| async move {
                server.fetch_configuration(&token, resource_id, scope).await
            })
            .await
    }

    async fn submit(
        &self,
        resource_id: EntityId,
        scope: ConfigurationScope,
        configuration: &Configuration,
    ) -> ClientResult<Mutation<Configuration>> {
        let request = UpdateRequest::Configuration {
            resource_id,
            scope,
            configuration: configuration.clone(),
        };
        let receipt = self
            .session
            .call("update", |server, token| async move {
                server.update(&token, &request).await
            })
            .await?;
        info!(entity = %format!("resource:{resource_id}"), ?scope, "configuration update submitted");
        match receipt_to_mutation(receipt, |_| Ok(()))? {
            Mutation::Applied(()) => Ok(Mutation::Applied(self.fetch(resource_id, scope).await?)),
            Mutation::Pending(pending) => Ok(Mutation::Pending(pending)),
        }
    }

    pub async fn get_resource_configuration(
        &self,
        resource_id: EntityId,
    ) -> ClientResult<Configuration> {
        self.fetch(resource_id, ConfigurationScope::Resource).await
    }

    pub async fn update_resource_configuration(
        &self,
        resource_id: EntityId,
        configuration: &Configuration,
    ) -> ClientResult<Mutation<Configuration>> {
        self.submit(resource_id, ConfigurationScope::Resource, configuration)
            .await
    }

    pub async fn is_resource_configuration_update_in_progress(
        &self,
        resource_id: EntityId,
    ) -> ClientResult<bool> {
        self.is_in_progress(OperationTarget::new(
            OperationDomain::ResourceConfiguration,
            resource_id,
        ))
        .await
    }

    pub async fn get_plugin_configuration(
        &self,
        resource_id: EntityId,
    ) -> ClientResult<Configuration> {
        self.fetch(resource_id, ConfigurationScope::Plugin).await
    }

    pub async fn update_plugin_configuration(
        &self,
        resource_id: EntityId,
        configuration: &Configuration,
    ) -> ClientResult<Mutation<Configuration>> {
        self.submit(resource_id, ConfigurationScope::Plugin, configuration)
            .await
    }

    /// History of resource configuration updates.
    pub async fn find_configuration_updates_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }
}

#[async_trait]
impl ManagerProxy for ConfigurationProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        CAPABILITIES
    }
}

fn expect_domain(target: OperationTarget) -> ClientResult<()> {
    if target.domain != OperationDomain::ResourceConfiguration {
        return Err(ClientError::Validation(format!(
            "{target} is not a configuration update"
        )));
    }
    Ok(())
}

#[async_trait]
impl CompletionProbe for ConfigurationProxy {
    type Settled = Configuration;

    async fn status(&self, target: OperationTarget) -> ClientResult<OperationStatus> {
        expect_domain(target)?;
        self.session
            .call("operation_status", move |server, token| async move {
                server.operation_status(&token, target).await
            })
            .await
    }

    async fn settle(&self, target: OperationTarget) -> ClientResult<Configuration> {
        expect_domain(target)?;
        self.get_resource_configuration(target.entity_id).await
    }
}
