//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Bundle, bundle version and deployment proxy."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info};

use super::{
    receipt_to_mutation, DeleteOutcome, DeletePolicy, ManagerProxy, MutationSpec, ProxyCapabilities,
};
use crate::criteria::{CriteriaQuery, QueryCriteria};
use crate::error::{ClientError, ClientResult};
use crate::model::{Configuration, Entity, EntityId, EntityKind, FileReference};
use crate::pending::{CompletionProbe, Mutation};
use crate::remote::{
    ContentUpload, EntityDraft, OperationDomain, OperationStatus, OperationTarget, UpdateRequest,
};
use crate::session::Session;

const CAPABILITIES: ProxyCapabilities = ProxyCapabilities {
    kinds: &[
        EntityKind::Bundle,
        EntityKind::BundleType,
        EntityKind::BundleVersion,
        EntityKind::BundleDeployDefinition,
        EntityKind::BundleDeployment,
    ],
    delete_policy: Some(DeletePolicy::Idempotent),
    mutations: &[
        MutationSpec::sync("create_bundle"),
        MutationSpec::sync("create_bundle_version"),
        MutationSpec::sync("add_bundle_file"),
        MutationSpec::sync("create_deploy_definition"),
        MutationSpec::asynchronous("schedule_bundle_deployment"),
    ],
};

/// Packages content into bundles and deploys bundle versions to platforms.
#[derive(Debug, Clone)]
pub struct BundleProxy {
    session: Session,
}

impl BundleProxy {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn create(&self, draft: EntityDraft) -> ClientResult<Entity> {
        let created = self
            .session
            .call("create", |server, token| async move {
                server.create(&token, &draft).await
            })
            .await?;
        info!(entity = %created.reference(), name = %created.name, "bundle entity created");
        Ok(created)
    }

    pub async fn get_all_bundle_types(&self) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(CriteriaQuery::all(EntityKind::BundleType))
            .await
    }

    /// Exact, case-sensitive lookup of a bundle type.
    pub async fn get_bundle_type_by_name(&self, name: &str) -> ClientResult<Option<Entity>> {
        let mut criteria = QueryCriteria::new(EntityKind::BundleType);
        criteria
            .filter_name(name)?
            .set_strict(true)
            .set_case_sensitive(true);
        Ok(self.find_by_criteria(criteria.build()).await?.into_iter().next())
    }

    pub async fn find_bundles_by_criteria(&self, query: CriteriaQuery) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    pub async fn find_bundle_versions_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    pub async fn find_bundle_deployments_by_criteria(
        &self,
        query: CriteriaQuery,
    ) -> ClientResult<Vec<Entity>> {
        self.find_by_criteria(query).await
    }

    /// Create a bundle. Names are unique; a duplicate fails with `Conflict`.
    pub async fn create_bundle(
        &self,
        name: &str,
        bundle_type_id: EntityId,
        description: Option<&str>,
    ) -> ClientResult<Entity> {
        self.create(EntityDraft::Bundle {
            name: name.to_owned(),
            bundle_type_id,
            description: description.map(str::to_owned),
        })
        .await
    }

    pub async fn create_bundle_version(
        &self,
        bundle_id: EntityId,
        name: &str,
        version: Option<&str>,
        recipe: &str,
    ) -> ClientResult<Entity> {
        self.create(EntityDraft::BundleVersion {
            bundle_id,
            name: name.to_owned(),
            version: version.map(str::to_owned),
            recipe: recipe.to_owned(),
        })
        .await
    }

    /// Attach raw bytes to a bundle version.
    pub async fn add_bundle_file_via_bytes(
        &self,
        bundle_version_id: EntityId,
        file_name: &str,
        version: &str,
        bytes: &[u8],
    ) -> ClientResult<FileReference> {
        let upload = ContentUpload {
            bundle_version_id,
            file_name: file_name.to_owned(),
            version: version.to_owned(),
            content: BASE64.encode(bytes),
        };
        let reference = self
            .session
            .call("upload", |server, token| async move {
                server.upload(&token, &upload).await
            })
            .await?;
        debug!(file = %reference.file_name, size = reference.size, "bundle file stored");
        Ok(reference)
    }

    pub async fn create_deploy_definition(
        &self,
        bundle_version_id: EntityId,
        name: &str,
        description: Option<&str>,
        configuration: Configuration,
    ) -> ClientResult<Entity> {
        self.create(EntityDraft::DeployDefinition {
            bundle_version_id,
            name: name.to_owned(),
            description: description.map(str::to_owned),
            configuration,
        })
        .await
    }

    /// Deploy to a platform. The pending target is the deployment record.
    pub async fn schedule_bundle_deployment(
        &self,
        deploy_definition_id: EntityId,
        platform_id: EntityId,
    ) -> ClientResult<Mutation<Entity>> {
        let request = UpdateRequest::ScheduleDeployment {
            deploy_definition_id,
            platform_id,
        };
        let receipt = self
            .session
            .call("update", |server, token| async move {
                server.update(&token, &request).await
            })
            .await?;
        info!(
            entity = %format!("bundle_deploy_definition:{deploy_definition_id}"),
            platform = %platform_id,
            "bundle deployment scheduled"
        );
        receipt_to_mutation(receipt, |entity| {
            entity.ok_or_else(|| ClientError::Server("deployment returned no record".into()))
        })
    }

    /// Delete a bundle with its versions and deployments.
    pub async fn delete_bundle(&self, id: EntityId) -> ClientResult<DeleteOutcome> {
        self.delete_entity(EntityKind::Bundle, id).await
    }

    /// Delete the bundle with exactly this name, if any.
    pub async fn delete_bundle_by_name(&self, name: &str) -> ClientResult<DeleteOutcome> {
        let mut criteria = QueryCriteria::new(EntityKind::Bundle);
        criteria
            .filter_name(name)?
            .set_strict(true)
            .set_case_sensitive(true);
        match self.find_by_criteria(criteria.build()).await?.first() {
            Some(bundle) => self.delete_bundle(bundle.id).await,
            None => Ok(DeleteOutcome::AlreadyAbsent),
        }
    }
}

#[async_trait]
impl ManagerProxy for BundleProxy {
    fn session(&self) -> &Session {
        &self.session
    }

    fn capabilities(&self) -> ProxyCapabilities {
        CAPABILITIES
    }
}

fn expect_domain(target: OperationTarget) -> ClientResult<()> {
    if target.domain != OperationDomain::BundleDeployment {
        return Err(ClientError::Validation(format!(
            "{target} is not a bundle deployment"
        )));
    }
    Ok(())
}

#[async_trait]
impl CompletionProbe for BundleProxy {
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
        self.get_by_id(EntityKind::BundleDeployment, target.entity_id)
            .await
    }
}
