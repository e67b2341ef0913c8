//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Resource group proxy."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;
use tracing::info;

use super::{DeleteOutcome, DeletePolicy, ManagerProxy, MutationSpec, ProxyCapabilities};
use crate::criteria::CriteriaQuery;
use crate::error::ClientResult;
use crate::model::{Entity, EntityId, EntityKind};
use crate::remote::EntityDraft;
use crate::session::Session;

const CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::ResourceGroup],
    delete_policy: Some(DeletePolicy::Idempotent),
    mutations: &[MutationSpec::sync("create_resource_group")],
};

#[derive(Debug, Clone)]
pub struct ResourceGroupProxy {
    session: Session,
}

impl ResourceGroupProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn find_resource_groups_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    /// Create a group. Names are unique; a duplicate fails with `Conflict`.
    pub async fn create_resource_group(
        &self,
        name: &str,
        resource_type_id: Option<EntityId>,
    ) -> ClientResult<Entity> {
        let draft = EntityDraft::ResourceGroup {
            name: name.to_owned(),
            resource_type_id,
        };
        let group = self
            .session
            .call("create", |server, token| async move {
                server.create(&token, &draft).await
            })
            .await?;
        info!(entity = %group.reference(), "resource group created");
        Ok(group)
    }

    pub async fn delete_resource_group(&self, id: EntityId) -> ClientResult<DeleteOutcome> {
        self.delete_entity(EntityKind::ResourceGroup, id).await
    }
}

#[async_trait]
impl ManagerProxy for ResourceGroupProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        CAPABILITIES
    }
}
