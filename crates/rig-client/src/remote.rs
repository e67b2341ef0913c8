//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Contract with the remote resource-management server."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::criteria::CriteriaQuery;
use crate::error::RemoteResult;
use crate::model::{Configuration, Entity, EntityId, EntityKind, FileReference};

/// Opaque token issued by the server on login.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Domain an asynchronous operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationDomain {
    /// Resource configuration update; the target is the resource.
    ResourceConfiguration,
    /// Scheduled resource operation; the target is the history record.
    ResourceOperation,
    /// Bundle deployment; the target is the deployment record.
    BundleDeployment,
}

/// Addresses one asynchronous operation on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationTarget {
    pub domain: OperationDomain,
    pub entity_id: EntityId,
}

impl OperationTarget {
    pub fn new(domain: OperationDomain, entity_id: EntityId) -> Self {
        Self { domain, entity_id }
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.entity_id)
    }
}

/// Status reported by the server for an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed { message: String },
}

/// Which configuration of a resource is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationScope {
    /// Settings of the managed resource itself; updates are asynchronous.
    Resource,
    /// Settings of the agent plugin that manages the resource; updates apply
    /// immediately.
    Plugin,
}

/// Parameters for scheduling a resource operation.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSchedule {
    pub operation_name: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default)]
    pub delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default)]
    pub repeat_interval: Duration,
    #[serde(default)]
    pub repeat_count: u32,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub parameters: Configuration,
    #[serde(default)]
    pub description: Option<String>,
}

impl OperationSchedule {
    /// Run `operation_name` once, immediately.
    pub fn immediate(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            delay: Duration::ZERO,
            repeat_interval: Duration::ZERO,
            repeat_count: 0,
            timeout: None,
            parameters: Configuration::new(),
            description: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Configuration) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Payload for entity creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "draft", rename_all = "snake_case")]
pub enum EntityDraft {
    /// Import a discovered resource into inventory.
    Resource {
        name: String,
        parent_id: Option<EntityId>,
        type_name: String,
    },
    ResourceGroup {
        name: String,
        resource_type_id: Option<EntityId>,
    },
    Bundle {
        name: String,
        bundle_type_id: EntityId,
        description: Option<String>,
    },
    BundleVersion {
        bundle_id: EntityId,
        name: String,
        version: Option<String>,
        recipe: String,
    },
    DeployDefinition {
        bundle_version_id: EntityId,
        name: String,
        description: Option<String>,
        configuration: Configuration,
    },
}

impl EntityDraft {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityDraft::Resource { .. } => EntityKind::Resource,
            EntityDraft::ResourceGroup { .. } => EntityKind::ResourceGroup,
            EntityDraft::Bundle { .. } => EntityKind::Bundle,
            EntityDraft::BundleVersion { .. } => EntityKind::BundleVersion,
            EntityDraft::DeployDefinition { .. } => EntityKind::BundleDeployDefinition,
        }
    }
}

/// Payload for entity mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum UpdateRequest {
    RenameResource {
        resource_id: EntityId,
        name: String,
    },
    Configuration {
        resource_id: EntityId,
        scope: ConfigurationScope,
        configuration: Configuration,
    },
    ScheduleOperation {
        resource_id: EntityId,
        schedule: OperationSchedule,
    },
    ScheduleDeployment {
        deploy_definition_id: EntityId,
        platform_id: EntityId,
    },
}

/// Server acknowledgement of an [`UpdateRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "receipt", rename_all = "snake_case")]
pub enum UpdateReceipt {
    /// The change is in effect.
    Applied { entity: Option<Entity> },
    /// The change was accepted and completes in the background.
    Pending {
        target: OperationTarget,
        submitted_at: DateTime<Utc>,
    },
}

/// Raw content attached to a bundle version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpload {
    pub bundle_version_id: EntityId,
    pub file_name: String,
    pub version: String,
    /// Base64 encoded bytes.
    pub content: String,
}

/// Remote-call routes shared by the HTTP transport and the simulated server.
pub mod rpc {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const INVALIDATE: &str = "invalidate";
    pub const FIND: &str = "find";
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const FETCH_CONFIGURATION: &str = "fetch-configuration";
    pub const OPERATION_STATUS: &str = "operation-status";
    pub const UPLOAD: &str = "upload";

    /// Header carrying the session token.
    pub const TOKEN_HEADER: &str = "x-session-token";
}

/// Request bodies for the remote-call routes.
pub mod wire {
    use serde::{Deserialize, Serialize};

    use super::{AuthToken, ConfigurationScope, OperationTarget};
    use crate::model::{EntityId, EntityKind};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoginRequest {
        pub username: String,
        pub password: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoginResponse {
        pub token: AuthToken,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DeleteRequest {
        pub kind: EntityKind,
        pub id: EntityId,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConfigurationRequest {
        pub resource_id: EntityId,
        pub scope: ConfigurationScope,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StatusRequest {
        pub target: OperationTarget,
    }
}

/// Operations the remote server exposes. Implemented by the HTTP transport
/// and by the in-process simulated server.
#[async_trait]
pub trait RemoteServer: Send + Sync {
    /// Human-readable location of the server, used in logs and reports.
    fn describe(&self) -> String;

    async fn authenticate(&self, username: &str, password: &str) -> RemoteResult<AuthToken>;

    async fn invalidate(&self, token: &AuthToken) -> RemoteResult<()>;

    async fn find(&self, token: &AuthToken, query: &CriteriaQuery) -> RemoteResult<Vec<Entity>>;

    async fn create(&self, token: &AuthToken, draft: &EntityDraft) -> RemoteResult<Entity>;

    async fn update(&self, token: &AuthToken, request: &UpdateRequest)
        -> RemoteResult<UpdateReceipt>;

    async fn delete(&self, token: &AuthToken, kind: EntityKind, id: EntityId) -> RemoteResult<()>;

    async fn fetch_configuration(
        &self,
        token: &AuthToken,
        resource_id: EntityId,
        scope: ConfigurationScope,
    ) -> RemoteResult<Configuration>;

    async fn operation_status(
        &self,
        token: &AuthToken,
        target: OperationTarget,
    ) -> RemoteResult<OperationStatus>;

    async fn upload(&self, token: &AuthToken, upload: &ContentUpload)
        -> RemoteResult<FileReference>;
}
