//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Resource inventory and resource type proxies."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;
use tracing::info;

use super::{
    receipt_to_mutation, DeleteOutcome, DeletePolicy, ManagerProxy, MutationSpec, ProxyCapabilities,
};
use crate::criteria::CriteriaQuery;
use crate::error::{ClientError, ClientResult};
use crate::model::{Entity, EntityId, EntityKind};
use crate::pending::Mutation;
use crate::remote::{EntityDraft, UpdateRequest};
use crate::session::Session;

const RESOURCE_CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::Resource],
    delete_policy: Some(DeletePolicy::Strict),
    mutations: &[
        MutationSpec::sync("import_resource"),
        MutationSpec::sync("rename_resource"),
    ],
};

/// Inventory of managed resources: platforms, servers and services.
#[derive(Debug, Clone)]
pub struct ResourceProxy {
    session: Session,
}

impl ResourceProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn find_resources_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    pub async fn get_resource(&self, id: EntityId) -> ClientResult<Entity> {
        self.get_by_id(EntityKind::Resource, id).await
    }

    /// Import a resource under `parent_id`. The type name must exist.
    pub async fn import_resource(
        &self,
        name: &str,
        parent_id: Option<EntityId>,
        type_name: &str,
    ) -> ClientResult<Entity> {
        let draft = EntityDraft::Resource {
            name: name.to_owned(),
            parent_id,
            type_name: type_name.to_owned(),
        };
        let created = self
            .session
            .call("create", |server, token| async move {
                server.create(&token, &draft).await
            })
            .await?;
        info!(entity = %created.reference(), "resource imported");
        Ok(created)
    }

    pub async fn rename_resource(&self, id: EntityId, name: &str) -> ClientResult<Mutation<Entity>> {
        let request = UpdateRequest::RenameResource {
            resource_id: id,
            name: name.to_owned(),
        };
        let receipt = self
            .session
            .call("update", |server, token| async move {
                server.update(&token, &request).await
            })
            .await?;
        receipt_to_mutation(receipt, |entity| {
            entity.ok_or_else(|| ClientError::Server("rename returned no resource".into()))
        })
    }

    /// Remove a resource from inventory. Fails with `NotFound` when absent.
    pub async fn uninventory_resource(&self, id: EntityId) -> ClientResult<DeleteOutcome> {
        self.delete_entity(EntityKind::Resource, id).await
    }
}

#[async_trait]
impl ManagerProxy for ResourceProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        RESOURCE_CAPABILITIES
    }
}

const RESOURCE_TYPE_CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::ResourceType],
    delete_policy: None,
    mutations: &[],
};

/// Read-only catalogue of resource types contributed by plugins.
#[derive(Debug, Clone)]
pub struct ResourceTypeProxy {
    session: Session,
}

impl ResourceTypeProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn find_resource_types_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    /// Exact, case-sensitive lookup of a type within one plugin.
    pub async fn get_resource_type_by_name_and_plugin(
        &self,
        name: &str,
        plugin: &str,
    ) -> ClientResult<Option<Entity>> {
        let mut criteria = self.criteria();
        criteria
            .filter_name(name)?
            .filter_plugin_name(plugin)?
            .set_strict(true)
            .set_case_sensitive(true);
        Ok(self.find_by_criteria(criteria.build()).await?.into_iter().next())
    }
}

#[async_trait]
impl ManagerProxy for ResourceTypeProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        RESOURCE_TYPE_CAPABILITIES
    }
}
