//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Entity records, configurations and content references exchanged with the server."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Well-known entity property names.
pub mod props {
    pub const PLUGIN: &str = "plugin";
    pub const STATUS: &str = "status";
    pub const SEVERITY: &str = "severity";
    pub const SOURCE: &str = "source";
    pub const DETAIL: &str = "detail";
    pub const VERSION: &str = "version";
    pub const RECIPE: &str = "recipe";
    pub const DESCRIPTION: &str = "description";
    pub const OPERATION_NAME: &str = "operationName";
    pub const RESOURCE_ID: &str = "resourceId";
    pub const ERROR_MESSAGE: &str = "errorMessage";
}

/// Values carried by the `status` property of asynchronous records.
pub mod status {
    pub const IN_PROGRESS: &str = "INPROGRESS";
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILURE: &str = "FAILURE";
}

/// Server-assigned entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId(value)
    }
}

/// Kinds of entities managed by the remote server.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Resource,
    ResourceType,
    ResourceGroup,
    Event,
    Bundle,
    BundleType,
    BundleVersion,
    BundleDeployDefinition,
    BundleDeployment,
    OperationHistory,
    ConfigurationUpdate,
}

/// A record owned by the remote server.
///
/// Every kind shares the same shape: an identity, a display name, an
/// optional parent link, an optional type name and free-form properties.
/// Which parent a kind points at is fixed per kind (a service resource
/// points at its server, a bundle version at its bundle, an event at the
/// resource that raised it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            parent_id: None,
            parent_name: None,
            type_name: None,
            properties: IndexMap::new(),
        }
    }

    pub fn with_parent(mut self, id: EntityId, name: impl Into<String>) -> Self {
        self.parent_id = Some(id);
        self.parent_name = Some(name.into());
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// `kind:id`, used in log fields.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

/// A single named simple property inside a [`Configuration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySimple {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl PropertySimple {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_string_value(&mut self, value: impl ToString) {
        self.value = Some(value.to_string());
    }
}

/// Named simple properties, ordered by insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    properties: IndexMap<String, PropertySimple>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_simple(&self, name: &str) -> Option<&PropertySimple> {
        self.properties.get(name)
    }

    pub fn get_simple_mut(&mut self, name: &str) -> Option<&mut PropertySimple> {
        self.properties.get_mut(name)
    }

    pub fn simple_value(&self, name: &str) -> Option<&str> {
        self.get_simple(name).and_then(PropertySimple::string_value)
    }

    /// Insert or replace a property, returning the previous one.
    pub fn put(&mut self, property: PropertySimple) -> Option<PropertySimple> {
        self.properties.insert(property.name.clone(), property)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.put(PropertySimple::new(name, value));
        self
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertySimple> {
        self.properties.values()
    }
}

/// Reference to content uploaded into a bundle version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub id: EntityId,
    pub bundle_version_id: EntityId,
    pub file_name: String,
    pub version: String,
    pub size: u64,
    /// Hex-encoded SHA-256 of the stored bytes.
    pub sha256: String,
}
