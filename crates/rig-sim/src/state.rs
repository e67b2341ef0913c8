//! ---
//! rig_section: "11-simulation"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Entity store, domain rules and background job bookkeeping of the simulated server."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rig_client::model::{props, status};
use rig_client::{
    Configuration, ConfigurationScope, ContentUpload, CriteriaQuery, Entity, EntityDraft,
    EntityId, EntityKind, FileReference, OperationDomain, OperationSchedule, OperationStatus,
    OperationTarget, RemoteError, RemoteResult, UpdateReceipt, UpdateRequest,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::inventory::CREATE_EVENTS_OPERATION;

/// Comma separated operation names a resource type supports.
pub(crate) const OPERATIONS_PROPERTY: &str = "operations";

/// Fault applied to every job submitted in one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Jobs never complete until the fault is cleared.
    Stall,
    /// Jobs complete with this failure message.
    Fail(String),
}

enum JobEffect {
    ApplyConfiguration {
        resource_id: EntityId,
        configuration: Configuration,
    },
    RunOperation {
        resource_id: EntityId,
        operation: String,
        parameters: Configuration,
    },
    Deploy,
}

struct Job {
    /// Entity whose status property tracks the job.
    record: EntityId,
    ready_at: Instant,
    effect: JobEffect,
    failure: Option<String>,
    stalled: bool,
}

pub(crate) struct SimState {
    next_id: i64,
    entities: IndexMap<EntityId, Entity>,
    resource_configs: HashMap<EntityId, Configuration>,
    plugin_configs: HashMap<EntityId, Configuration>,
    deploy_configs: HashMap<EntityId, Configuration>,
    files: IndexMap<EntityId, FileReference>,
    jobs: IndexMap<OperationTarget, Job>,
    faults: HashMap<OperationDomain, Fault>,
    completion_delay: Duration,
}

impl SimState {
    pub(crate) fn new(completion_delay: Duration) -> Self {
        Self {
            next_id: 10_000,
            entities: IndexMap::new(),
            resource_configs: HashMap::new(),
            plugin_configs: HashMap::new(),
            deploy_configs: HashMap::new(),
            files: IndexMap::new(),
            jobs: IndexMap::new(),
            faults: HashMap::new(),
            completion_delay,
        }
    }

    fn allocate(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    fn entity(&self, kind: EntityKind, id: EntityId) -> RemoteResult<&Entity> {
        self.entities
            .get(&id)
            .filter(|entity| entity.kind == kind)
            .ok_or(RemoteError::NotFound { kind, id })
    }

    fn named(&self, kind: EntityKind, name: &str) -> Option<&Entity> {
        self.entities
            .values()
            .find(|entity| entity.kind == kind && entity.name == name)
    }

    fn children(&self, parent: EntityId) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|entity| entity.parent_id == Some(parent))
            .map(|entity| entity.id)
            .collect()
    }

    fn set_status(&mut self, record: EntityId, value: &str, error: Option<String>) {
        if let Some(entity) = self.entities.get_mut(&record) {
            entity
                .properties
                .insert(props::STATUS.to_owned(), value.to_owned());
            if let Some(message) = error {
                entity
                    .properties
                    .insert(props::ERROR_MESSAGE.to_owned(), message);
            }
        }
    }

    // --- seeding -------------------------------------------------------

    pub(crate) fn add_resource_type(
        &mut self,
        name: &str,
        plugin: &str,
        operations: &[&str],
    ) -> EntityId {
        self.add_named(EntityKind::ResourceType, name, |entity| {
            entity
                .with_property(props::PLUGIN, plugin)
                .with_property(OPERATIONS_PROPERTY, operations.join(","))
        })
    }

    pub(crate) fn add_resource(
        &mut self,
        name: &str,
        parent: Option<EntityId>,
        type_name: &str,
        plugin: &str,
    ) -> EntityId {
        let id = self.allocate();
        let mut entity = Entity::new(id, EntityKind::Resource, name)
            .with_type(type_name)
            .with_property(props::PLUGIN, plugin);
        if let Some(parent) = parent.and_then(|parent| self.entities.get(&parent)) {
            entity = entity.with_parent(parent.id, parent.name.clone());
        }
        self.entities.insert(id, entity);
        self.resource_configs.insert(id, Configuration::new());
        self.plugin_configs.insert(id, Configuration::new());
        id
    }

    pub(crate) fn add_named(
        &mut self,
        kind: EntityKind,
        name: &str,
        decorate: impl FnOnce(Entity) -> Entity,
    ) -> EntityId {
        let id = self.allocate();
        self.entities
            .insert(id, decorate(Entity::new(id, kind, name)));
        id
    }

    pub(crate) fn seed_configuration(
        &mut self,
        resource: EntityId,
        resource_config: Configuration,
        plugin_config: Configuration,
    ) {
        self.resource_configs.insert(resource, resource_config);
        self.plugin_configs.insert(resource, plugin_config);
    }

    // --- queries -------------------------------------------------------

    pub(crate) fn find(&self, query: &CriteriaQuery) -> RemoteResult<Vec<Entity>> {
        query
            .validate()
            .map_err(|err| RemoteError::Validation(err.to_string()))?;
        let kind = query.kind();
        Ok(query.apply(
            self.entities
                .values()
                .filter(|entity| entity.kind == kind)
                .cloned(),
        ))
    }

    pub(crate) fn fetch_configuration(
        &self,
        resource_id: EntityId,
        scope: ConfigurationScope,
    ) -> RemoteResult<Configuration> {
        self.entity(EntityKind::Resource, resource_id)?;
        let store = match scope {
            ConfigurationScope::Resource => &self.resource_configs,
            ConfigurationScope::Plugin => &self.plugin_configs,
        };
        Ok(store.get(&resource_id).cloned().unwrap_or_default())
    }

    pub(crate) fn status(&self, target: OperationTarget) -> RemoteResult<OperationStatus> {
        match target.domain {
            OperationDomain::ResourceConfiguration => {
                self.entity(EntityKind::Resource, target.entity_id)?;
                if self.jobs.contains_key(&target) {
                    return Ok(OperationStatus::InProgress);
                }
                let latest = self.entities.values().rev().find(|entity| {
                    entity.kind == EntityKind::ConfigurationUpdate
                        && entity.parent_id == Some(target.entity_id)
                });
                Ok(latest
                    .map(record_status)
                    .unwrap_or(OperationStatus::Succeeded))
            }
            OperationDomain::ResourceOperation => self
                .entity(EntityKind::OperationHistory, target.entity_id)
                .map(record_status),
            OperationDomain::BundleDeployment => self
                .entity(EntityKind::BundleDeployment, target.entity_id)
                .map(record_status),
        }
    }

    // --- creation ------------------------------------------------------

    pub(crate) fn create(&mut self, draft: &EntityDraft) -> RemoteResult<Entity> {
        let created = match draft {
            EntityDraft::Resource {
                name,
                parent_id,
                type_name,
            } => self.import_resource(name, *parent_id, type_name)?,
            EntityDraft::ResourceGroup {
                name,
                resource_type_id,
            } => self.create_group(name, *resource_type_id)?,
            EntityDraft::Bundle {
                name,
                bundle_type_id,
                description,
            } => self.create_bundle(name, *bundle_type_id, description.as_deref())?,
            EntityDraft::BundleVersion {
                bundle_id,
                name,
                version,
                recipe,
            } => self.create_bundle_version(*bundle_id, name, version.as_deref(), recipe)?,
            EntityDraft::DeployDefinition {
                bundle_version_id,
                name,
                description,
                configuration,
            } => self.create_deploy_definition(
                *bundle_version_id,
                name,
                description.as_deref(),
                configuration,
            )?,
        };
        info!(entity = %created.reference(), name = %created.name, "simulated entity created");
        Ok(created)
    }

    fn import_resource(
        &mut self,
        name: &str,
        parent_id: Option<EntityId>,
        type_name: &str,
    ) -> RemoteResult<Entity> {
        require_name(name)?;
        let plugin = self
            .named(EntityKind::ResourceType, type_name)
            .and_then(|resource_type| resource_type.property(props::PLUGIN))
            .map(str::to_owned)
            .ok_or_else(|| RemoteError::Validation(format!("unknown resource type '{type_name}'")))?;
        if let Some(parent) = parent_id {
            self.entity(EntityKind::Resource, parent)?;
        }
        let duplicate = self.entities.values().any(|entity| {
            entity.kind == EntityKind::Resource
                && entity.parent_id == parent_id
                && entity.name == name
        });
        if duplicate {
            return Err(RemoteError::Conflict(format!(
                "resource '{name}' already exists under this parent"
            )));
        }
        let id = self.add_resource(name, parent_id, type_name, &plugin);
        self.entity(EntityKind::Resource, id).cloned()
    }

    fn create_group(
        &mut self,
        name: &str,
        resource_type_id: Option<EntityId>,
    ) -> RemoteResult<Entity> {
        require_name(name)?;
        if self.named(EntityKind::ResourceGroup, name).is_some() {
            return Err(RemoteError::Conflict(format!(
                "resource group '{name}' already exists"
            )));
        }
        let type_name = match resource_type_id {
            Some(id) => Some(self.entity(EntityKind::ResourceType, id)?.name.clone()),
            None => None,
        };
        let id = self.add_named(EntityKind::ResourceGroup, name, |entity| match type_name {
            Some(type_name) => entity.with_type(type_name),
            None => entity,
        });
        self.entity(EntityKind::ResourceGroup, id).cloned()
    }

    fn create_bundle(
        &mut self,
        name: &str,
        bundle_type_id: EntityId,
        description: Option<&str>,
    ) -> RemoteResult<Entity> {
        require_name(name)?;
        let type_name = self.entity(EntityKind::BundleType, bundle_type_id)?.name.clone();
        if self.named(EntityKind::Bundle, name).is_some() {
            return Err(RemoteError::Conflict(format!("bundle '{name}' already exists")));
        }
        let id = self.add_named(EntityKind::Bundle, name, |entity| {
            let entity = entity.with_type(type_name);
            match description {
                Some(text) => entity.with_property(props::DESCRIPTION, text),
                None => entity,
            }
        });
        self.entity(EntityKind::Bundle, id).cloned()
    }

    fn create_bundle_version(
        &mut self,
        bundle_id: EntityId,
        name: &str,
        version: Option<&str>,
        recipe: &str,
    ) -> RemoteResult<Entity> {
        require_name(name)?;
        if recipe.trim().is_empty() {
            return Err(RemoteError::Validation("bundle recipe cannot be empty".into()));
        }
        let bundle_name = self.entity(EntityKind::Bundle, bundle_id)?.name.clone();
        let existing: Vec<&str> = self
            .entities
            .values()
            .filter(|entity| {
                entity.kind == EntityKind::BundleVersion && entity.parent_id == Some(bundle_id)
            })
            .filter_map(|entity| entity.property(props::VERSION))
            .collect();
        let version = match version {
            Some(explicit) => explicit.to_owned(),
            None => format!("{}.0", existing.len() + 1),
        };
        if existing.contains(&version.as_str()) {
            return Err(RemoteError::Conflict(format!(
                "bundle '{bundle_name}' already has version {version}"
            )));
        }
        let id = self.allocate();
        let entity = Entity::new(id, EntityKind::BundleVersion, name)
            .with_parent(bundle_id, bundle_name)
            .with_property(props::VERSION, version)
            .with_property(props::RECIPE, recipe);
        self.entities.insert(id, entity.clone());
        Ok(entity)
    }

    fn create_deploy_definition(
        &mut self,
        bundle_version_id: EntityId,
        name: &str,
        description: Option<&str>,
        configuration: &Configuration,
    ) -> RemoteResult<Entity> {
        require_name(name)?;
        let version = self.entity(EntityKind::BundleVersion, bundle_version_id)?;
        let missing: Vec<String> = recipe_variables(version.property(props::RECIPE).unwrap_or(""))
            .into_iter()
            .filter(|variable| configuration.simple_value(variable).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(RemoteError::Validation(format!(
                "deploy definition is missing required properties: {}",
                missing.join(", ")
            )));
        }
        let version_name = version.name.clone();
        let id = self.allocate();
        let mut entity = Entity::new(id, EntityKind::BundleDeployDefinition, name)
            .with_parent(bundle_version_id, version_name);
        if let Some(text) = description {
            entity = entity.with_property(props::DESCRIPTION, text);
        }
        self.entities.insert(id, entity.clone());
        self.deploy_configs.insert(id, configuration.clone());
        Ok(entity)
    }

    pub(crate) fn upload(&mut self, upload: &ContentUpload) -> RemoteResult<FileReference> {
        self.entity(EntityKind::BundleVersion, upload.bundle_version_id)?;
        require_name(&upload.file_name)?;
        let bytes = BASE64
            .decode(upload.content.as_bytes())
            .map_err(|err| RemoteError::Validation(format!("content is not valid base64: {err}")))?;
        let duplicate = self.files.values().any(|file| {
            file.bundle_version_id == upload.bundle_version_id && file.file_name == upload.file_name
        });
        if duplicate {
            return Err(RemoteError::Conflict(format!(
                "bundle version already contains '{}'",
                upload.file_name
            )));
        }
        let id = self.allocate();
        let reference = FileReference {
            id,
            bundle_version_id: upload.bundle_version_id,
            file_name: upload.file_name.clone(),
            version: upload.version.clone(),
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(&bytes)),
        };
        self.files.insert(id, reference.clone());
        debug!(file = %reference.file_name, size = reference.size, "simulated upload stored");
        Ok(reference)
    }

    // --- mutation ------------------------------------------------------

    pub(crate) fn update(
        &mut self,
        request: &UpdateRequest,
        now: Instant,
        submitted_at: DateTime<Utc>,
    ) -> RemoteResult<UpdateReceipt> {
        match request {
            UpdateRequest::RenameResource { resource_id, name } => {
                self.rename_resource(*resource_id, name)
            }
            UpdateRequest::Configuration {
                resource_id,
                scope,
                configuration,
            } => self.update_configuration(*resource_id, *scope, configuration, now, submitted_at),
            UpdateRequest::ScheduleOperation {
                resource_id,
                schedule,
            } => self.schedule_operation(*resource_id, schedule, now, submitted_at),
            UpdateRequest::ScheduleDeployment {
                deploy_definition_id,
                platform_id,
            } => self.schedule_deployment(*deploy_definition_id, *platform_id, now, submitted_at),
        }
    }

    fn rename_resource(&mut self, resource_id: EntityId, name: &str) -> RemoteResult<UpdateReceipt> {
        require_name(name)?;
        let parent = self.entity(EntityKind::Resource, resource_id)?.parent_id;
        let clash = self.entities.values().any(|entity| {
            entity.kind == EntityKind::Resource
                && entity.id != resource_id
                && entity.parent_id == parent
                && entity.name == name
        });
        if clash {
            return Err(RemoteError::Conflict(format!(
                "resource '{name}' already exists under this parent"
            )));
        }
        for child in self.children(resource_id) {
            if let Some(entity) = self.entities.get_mut(&child) {
                entity.parent_name = Some(name.to_owned());
            }
        }
        let entity = self
            .entities
            .get_mut(&resource_id)
            .ok_or(RemoteError::NotFound {
                kind: EntityKind::Resource,
                id: resource_id,
            })?;
        entity.name = name.to_owned();
        Ok(UpdateReceipt::Applied {
            entity: Some(entity.clone()),
        })
    }

    fn update_configuration(
        &mut self,
        resource_id: EntityId,
        scope: ConfigurationScope,
        configuration: &Configuration,
        now: Instant,
        submitted_at: DateTime<Utc>,
    ) -> RemoteResult<UpdateReceipt> {
        let resource_name = self.entity(EntityKind::Resource, resource_id)?.name.clone();
        if configuration.iter().any(|property| property.name.trim().is_empty()) {
            return Err(RemoteError::Validation(
                "configuration contains a property without a name".into(),
            ));
        }
        if scope == ConfigurationScope::Plugin {
            self.plugin_configs
                .insert(resource_id, configuration.clone());
            return Ok(UpdateReceipt::Applied { entity: None });
        }

        let target = OperationTarget::new(OperationDomain::ResourceConfiguration, resource_id);
        if self.jobs.contains_key(&target) {
            return Err(RemoteError::Conflict(format!(
                "configuration update already in progress for resource {resource_id}"
            )));
        }
        let record = self.allocate();
        self.entities.insert(
            record,
            Entity::new(record, EntityKind::ConfigurationUpdate, "resource-configuration-update")
                .with_parent(resource_id, resource_name)
                .with_property(props::STATUS, status::IN_PROGRESS),
        );
        self.enqueue(
            target,
            record,
            JobEffect::ApplyConfiguration {
                resource_id,
                configuration: configuration.clone(),
            },
            now,
            Duration::ZERO,
            None,
        );
        Ok(UpdateReceipt::Pending {
            target,
            submitted_at,
        })
    }

    fn schedule_operation(
        &mut self,
        resource_id: EntityId,
        schedule: &OperationSchedule,
        now: Instant,
        submitted_at: DateTime<Utc>,
    ) -> RemoteResult<UpdateReceipt> {
        let resource = self.entity(EntityKind::Resource, resource_id)?;
        let resource_name = resource.name.clone();
        let type_name = resource.type_name.clone().unwrap_or_default();
        let supported = self
            .named(EntityKind::ResourceType, &type_name)
            .and_then(|resource_type| resource_type.property(OPERATIONS_PROPERTY))
            .is_some_and(|ops| ops.split(',').any(|op| op == schedule.operation_name));
        if !supported {
            return Err(RemoteError::Validation(format!(
                "operation '{}' is not defined for type '{type_name}'",
                schedule.operation_name
            )));
        }

        let record = self.allocate();
        let mut history = Entity::new(record, EntityKind::OperationHistory, &schedule.operation_name)
            .with_parent(resource_id, resource_name)
            .with_property(props::OPERATION_NAME, &schedule.operation_name)
            .with_property(props::STATUS, status::IN_PROGRESS);
        if let Some(description) = &schedule.description {
            history = history.with_property(props::DESCRIPTION, description);
        }
        self.entities.insert(record, history);

        let timed_out = schedule
            .timeout
            .filter(|timeout| !timeout.is_zero() && *timeout < self.completion_delay)
            .map(|_| "operation timed out".to_owned());
        let target = OperationTarget::new(OperationDomain::ResourceOperation, record);
        self.enqueue(
            target,
            record,
            JobEffect::RunOperation {
                resource_id,
                operation: schedule.operation_name.clone(),
                parameters: schedule.parameters.clone(),
            },
            now,
            schedule.delay,
            timed_out,
        );
        Ok(UpdateReceipt::Pending {
            target,
            submitted_at,
        })
    }

    fn schedule_deployment(
        &mut self,
        definition_id: EntityId,
        platform_id: EntityId,
        now: Instant,
        submitted_at: DateTime<Utc>,
    ) -> RemoteResult<UpdateReceipt> {
        let definition_name = self
            .entity(EntityKind::BundleDeployDefinition, definition_id)?
            .name
            .clone();
        let platform = self.entity(EntityKind::Resource, platform_id)?;
        if platform.parent_id.is_some() {
            return Err(RemoteError::Validation(format!(
                "deployment target '{}' is not a platform",
                platform.name
            )));
        }

        let record = self.allocate();
        self.entities.insert(
            record,
            Entity::new(record, EntityKind::BundleDeployment, &definition_name)
                .with_parent(definition_id, definition_name.clone())
                .with_property(props::RESOURCE_ID, platform_id.to_string())
                .with_property(props::STATUS, status::IN_PROGRESS),
        );
        let target = OperationTarget::new(OperationDomain::BundleDeployment, record);
        self.enqueue(target, record, JobEffect::Deploy, now, Duration::ZERO, None);
        Ok(UpdateReceipt::Pending {
            target,
            submitted_at,
        })
    }

    fn enqueue(
        &mut self,
        target: OperationTarget,
        record: EntityId,
        effect: JobEffect,
        now: Instant,
        extra_delay: Duration,
        failure: Option<String>,
    ) {
        let fault = self.faults.get(&target.domain);
        let job = Job {
            record,
            ready_at: now + self.completion_delay + extra_delay,
            effect,
            failure: match fault {
                Some(Fault::Fail(message)) => Some(message.clone()),
                _ => failure,
            },
            stalled: matches!(fault, Some(Fault::Stall)),
        };
        debug!(target = %target, stalled = job.stalled, "simulated job queued");
        self.jobs.insert(target, job);
    }

    // --- deletion ------------------------------------------------------

    pub(crate) fn delete(&mut self, kind: EntityKind, id: EntityId) -> RemoteResult<()> {
        self.entity(kind, id)?;
        if matches!(
            kind,
            EntityKind::ResourceType | EntityKind::BundleType | EntityKind::ConfigurationUpdate
        ) {
            return Err(RemoteError::Validation(format!("{kind} records cannot be deleted")));
        }
        let removed = self.remove_cascade(id);
        info!(entity = %format!("{kind}:{id}"), removed, "simulated entity deleted");
        Ok(())
    }

    fn remove_cascade(&mut self, id: EntityId) -> usize {
        let mut removed = 0;
        for child in self.children(id) {
            removed += self.remove_cascade(child);
        }
        if self.entities.shift_remove(&id).is_some() {
            removed += 1;
        }
        self.resource_configs.remove(&id);
        self.plugin_configs.remove(&id);
        self.deploy_configs.remove(&id);
        self.files.retain(|_, file| file.bundle_version_id != id);
        self.jobs.retain(|target, job| job.record != id && target.entity_id != id);
        removed
    }

    // --- background completion ----------------------------------------

    /// Complete every job whose delay has elapsed.
    pub(crate) fn advance(&mut self, now: Instant) {
        let ready: Vec<OperationTarget> = self
            .jobs
            .iter()
            .filter(|(_, job)| !job.stalled && job.ready_at <= now)
            .map(|(target, _)| *target)
            .collect();
        for target in ready {
            if let Some(job) = self.jobs.shift_remove(&target) {
                self.complete(target, job);
            }
        }
    }

    fn complete(&mut self, target: OperationTarget, job: Job) {
        let outcome = match job.failure {
            Some(message) => Err(message),
            None => self.apply(job.effect),
        };
        match outcome {
            Ok(()) => {
                self.set_status(job.record, status::SUCCESS, None);
                debug!(target = %target, "simulated job succeeded");
            }
            Err(message) => {
                debug!(target = %target, %message, "simulated job failed");
                self.set_status(job.record, status::FAILURE, Some(message));
            }
        }
    }

    fn apply(&mut self, effect: JobEffect) -> Result<(), String> {
        match effect {
            JobEffect::ApplyConfiguration {
                resource_id,
                configuration,
            } => {
                if !self.entities.contains_key(&resource_id) {
                    return Err("resource no longer exists".into());
                }
                self.resource_configs.insert(resource_id, configuration);
                Ok(())
            }
            JobEffect::RunOperation {
                resource_id,
                operation,
                parameters,
            } if operation == CREATE_EVENTS_OPERATION => self.create_events(resource_id, &parameters),
            JobEffect::RunOperation { .. } | JobEffect::Deploy => Ok(()),
        }
    }

    fn create_events(&mut self, resource_id: EntityId, parameters: &Configuration) -> Result<(), String> {
        let resource_name = self
            .entities
            .get(&resource_id)
            .map(|resource| resource.name.clone())
            .ok_or_else(|| "resource no longer exists".to_owned())?;
        let count = match parameters.simple_value("count") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| format!("count '{raw}' is not a number"))?,
            None => 1,
        };
        let severity = parameters.simple_value("severity").unwrap_or("INFO").to_owned();
        let source = parameters
            .simple_value("source")
            .unwrap_or(&resource_name)
            .to_owned();
        let detail = parameters.simple_value("details").unwrap_or("").to_owned();
        for _ in 0..count {
            let id = self.allocate();
            self.entities.insert(
                id,
                Entity::new(id, EntityKind::Event, format!("event-{}", id.0))
                    .with_parent(resource_id, resource_name.clone())
                    .with_property(props::SEVERITY, severity.clone())
                    .with_property(props::SOURCE, source.clone())
                    .with_property(props::DETAIL, detail.clone()),
            );
        }
        Ok(())
    }

    // --- faults --------------------------------------------------------

    pub(crate) fn set_fault(&mut self, domain: OperationDomain, fault: Fault) {
        self.faults.insert(domain, fault);
    }

    /// Clear the fault and release stalled jobs of `domain`.
    pub(crate) fn clear_fault(&mut self, domain: OperationDomain) {
        self.faults.remove(&domain);
        for (target, job) in self.jobs.iter_mut() {
            if target.domain == domain {
                job.stalled = false;
            }
        }
    }

    pub(crate) fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn deploy_configuration(&self, definition: EntityId) -> Option<&Configuration> {
        self.deploy_configs.get(&definition)
    }

    pub(crate) fn files_of(&self, bundle_version_id: EntityId) -> Vec<FileReference> {
        self.files
            .values()
            .filter(|file| file.bundle_version_id == bundle_version_id)
            .cloned()
            .collect()
    }
}

fn record_status(entity: &Entity) -> OperationStatus {
    match entity.property(props::STATUS) {
        Some(status::IN_PROGRESS) => OperationStatus::InProgress,
        Some(status::FAILURE) => OperationStatus::Failed {
            message: entity
                .property(props::ERROR_MESSAGE)
                .unwrap_or("operation failed")
                .to_owned(),
        },
        _ => OperationStatus::Succeeded,
    }
}

fn require_name(name: &str) -> RemoteResult<()> {
    if name.trim().is_empty() {
        return Err(RemoteError::Validation("name cannot be empty".into()));
    }
    Ok(())
}

/// Names of `<%name%>` replacement variables in a bundle recipe.
fn recipe_variables(recipe: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    let mut rest = recipe;
    while let Some(start) = rest.find("<%") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("%>") else {
            break;
        };
        let name = after[..end].trim();
        if !name.is_empty() && !variables.iter().any(|known| known == name) {
            variables.push(name.to_owned());
        }
        rest = &after[end + 2..];
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_variables_are_collected_once() {
        let recipe = "file -s a.war -d <%bundleTest.deployHome%>/a.war; chmod <% mode %> <%bundleTest.deployHome%>";
        assert_eq!(
            recipe_variables(recipe),
            vec!["bundleTest.deployHome".to_owned(), "mode".to_owned()]
        );
        assert!(recipe_variables("no variables <% unterminated").is_empty());
    }

    #[test]
    fn stalled_jobs_wait_for_fault_clearance() {
        let mut state = SimState::new(Duration::ZERO);
        let resource = state.add_resource("platform-0", None, "Linux", "Platforms");
        state.set_fault(OperationDomain::ResourceConfiguration, Fault::Stall);
        let now = Instant::now();
        let receipt = state
            .update(
                &UpdateRequest::Configuration {
                    resource_id: resource,
                    scope: ConfigurationScope::Resource,
                    configuration: Configuration::new().with("a", "b"),
                },
                now,
                Utc::now(),
            )
            .unwrap();
        let UpdateReceipt::Pending { target, .. } = receipt else {
            panic!("expected pending receipt");
        };

        state.advance(now + Duration::from_secs(60));
        assert_eq!(state.status(target).unwrap(), OperationStatus::InProgress);

        state.clear_fault(OperationDomain::ResourceConfiguration);
        state.advance(now + Duration::from_secs(60));
        assert_eq!(state.status(target).unwrap(), OperationStatus::Succeeded);
        assert_eq!(
            state
                .fetch_configuration(resource, ConfigurationScope::Resource)
                .unwrap()
                .simple_value("a"),
            Some("b")
        );
    }

    #[test]
    fn cascade_removes_descendants() {
        let mut state = SimState::new(Duration::ZERO);
        let platform = state.add_resource("platform-0", None, "Linux", "Platforms");
        let server = state.add_resource("server-omega-0", Some(platform), "server-omega", "PerfTest");
        let service = state.add_resource("service-beta-0", Some(server), "service-beta", "PerfTest");
        state.delete(EntityKind::Resource, server).unwrap();
        assert!(state.entity(EntityKind::Resource, service).is_err());
        assert!(state.entity(EntityKind::Resource, platform).is_ok());
        assert_eq!(
            state.delete(EntityKind::Resource, server).unwrap_err(),
            RemoteError::NotFound {
                kind: EntityKind::Resource,
                id: server
            }
        );
    }
}
