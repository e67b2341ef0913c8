//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Resource operation scheduling and history proxy."
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
use crate::pending::{CompletionProbe, Mutation};
use crate::remote::{
    OperationDomain, OperationSchedule, OperationStatus, OperationTarget, UpdateRequest,
};
use crate::session::Session;

const CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::OperationHistory],
    delete_policy: Some(DeletePolicy::Strict),
    mutations: &[MutationSpec::asynchronous("schedule_resource_operation")],
};

/// Schedules operations on resources and reads their history records.
#[derive(Debug, Clone)]
pub struct OperationProxy {
    session: Session,
}

impl OperationProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Schedule an operation. The pending target is the history record.
    pub async fn schedule_resource_operation(
        &self,
        resource_id: EntityId,
        schedule: OperationSchedule,
    ) -> ClientResult<Mutation<Entity>> {
        let operation = schedule.operation_name.clone();
        let request = UpdateRequest::ScheduleOperation {
            resource_id,
            schedule,
        };
        let receipt = self
            .session
            .call("update", |server, token| async move {
                server.update(&token, &request).await
            })
            .await?;
        info!(entity = %format!("resource:{resource_id}"), %operation, "operation scheduled");
        receipt_to_mutation(receipt, |entity| {
            entity.ok_or_else(|| ClientError::Server("schedule returned no history".into()))
        })
    }

    pub async fn find_operation_history_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    pub async fn is_operation_in_progress(&self, history_id: EntityId) -> ClientResult<bool> {
        self.is_in_progress(OperationTarget::new(
            OperationDomain::ResourceOperation,
            history_id,
        ))
        .await
    }

    /// Delete a history record. Fails with `NotFound` when absent.
    pub async fn delete_operation_history(&self, id: EntityId) -> ClientResult<DeleteOutcome> {
        self.delete_entity(EntityKind::OperationHistory, id).await
    }
}

#[async_trait]
impl ManagerProxy for OperationProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        CAPABILITIES
    }
}

fn expect_domain(target: OperationTarget) -> ClientResult<()> {
    if target.domain != OperationDomain::ResourceOperation {
        return Err(ClientError::Validation(format!(
            "{target} is not a resource operation"
        )));
    }
    Ok(())
}

#[async_trait]
impl CompletionProbe for OperationProxy {
    type Settled = Entity;

    async fn status(&self, target: OperationTarget) -> ClientResult<OperationStatus> {
        expect_domain(target)?;
        self.session
            .call("operation_status", move |server, token| async move {
                server.operation_status(&token, target).await
            })
            .await
    }

    async fn settle(&self, target: OperationTarget) -> ClientResult<Entity> {
        expect_domain(target)?;
        self.get_by_id(EntityKind::OperationHistory, target.entity_id)
            .await
    }
}
