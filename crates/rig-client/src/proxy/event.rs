//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Event log proxy."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;

use super::{DeleteOutcome, DeletePolicy, ManagerProxy, ProxyCapabilities};
use crate::criteria::CriteriaQuery;
use crate::error::ClientResult;
use crate::model::{Entity, EntityId, EntityKind};
use crate::session::Session;

const CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[EntityKind::Event],
    delete_policy: Some(DeletePolicy::Idempotent),
    mutations: &[],
};

/// Events raised by resources. Events are produced server side, typically by
/// scheduling an operation that emits them.
#[derive(Debug, Clone)]
pub struct EventProxy {
    session: Session,
}

impl EventProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn find_events_by_criteria(&self, query: CriteriaQuery) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    pub async fn delete_event(&self, id: EntityId) -> ClientResult<DeleteOutcome> {
        self.delete_entity(EntityKind::Event, id).await
    }
}

#[async_trait]
impl ManagerProxy for EventProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        CAPABILITIES
    }
}
