//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Criteria builder, filter vocabulary and matching semantics."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
//! Query criteria for entity lookups.
//!
//! A [`QueryCriteria`] collects filters for one [`EntityKind`]. Filters
//! combine as a conjunction; setting the same key twice keeps the last
//! value. Text filters match case-insensitively unless
//! [`QueryCriteria::set_case_sensitive`] is enabled, and match by substring
//! unless [`QueryCriteria::set_strict`] is enabled. Id filters always match
//! exactly.
//!
//! [`QueryCriteria::build`] freezes the builder into a [`CriteriaQuery`],
//! which is what travels to the server. The server evaluates it with
//! [`CriteriaQuery::apply`]: filter, then sort, then page.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::model::{props, Entity, EntityId, EntityKind};

/// Filter keys understood by the server, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FilterKey {
    Id,
    Name,
    ParentResourceId,
    ParentResourceName,
    ResourceTypeName,
    PluginName,
    ResourceId,
    Severity,
    Source,
    Detail,
    BundleId,
    BundleName,
    BundleTypeName,
    BundleVersionId,
    DeployDefinitionId,
    Version,
    OperationName,
    Status,
}

/// Entity attribute a filter key reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    Id,
    Name,
    ParentId,
    ParentName,
    TypeName,
    Property(&'static str),
}

impl FilterKey {
    /// Whether the key compares identifiers rather than text.
    pub fn is_id_valued(self) -> bool {
        matches!(
            self,
            FilterKey::Id
                | FilterKey::ParentResourceId
                | FilterKey::ResourceId
                | FilterKey::BundleId
                | FilterKey::BundleVersionId
                | FilterKey::DeployDefinitionId
        )
    }

    fn attribute(self, kind: EntityKind) -> Attribute {
        match self {
            FilterKey::Id => Attribute::Id,
            FilterKey::Name => Attribute::Name,
            FilterKey::ParentResourceId
            | FilterKey::BundleId
            | FilterKey::BundleVersionId
            | FilterKey::DeployDefinitionId => Attribute::ParentId,
            // Deployments hang off their definition; the target platform is a property.
            FilterKey::ResourceId if kind == EntityKind::BundleDeployment => {
                Attribute::Property(props::RESOURCE_ID)
            }
            FilterKey::ResourceId => Attribute::ParentId,
            FilterKey::ParentResourceName | FilterKey::BundleName => Attribute::ParentName,
            FilterKey::ResourceTypeName | FilterKey::BundleTypeName => Attribute::TypeName,
            FilterKey::PluginName => Attribute::Property(props::PLUGIN),
            FilterKey::Severity => Attribute::Property(props::SEVERITY),
            FilterKey::Source => Attribute::Property(props::SOURCE),
            FilterKey::Detail => Attribute::Property(props::DETAIL),
            FilterKey::Version => Attribute::Property(props::VERSION),
            FilterKey::OperationName => Attribute::Property(props::OPERATION_NAME),
            FilterKey::Status => Attribute::Property(props::STATUS),
        }
    }
}

impl EntityKind {
    /// The closed set of filter keys accepted for this kind.
    pub fn recognized_filters(self) -> &'static [FilterKey] {
        use FilterKey::*;
        match self {
            EntityKind::Resource => &[
                Id,
                Name,
                ParentResourceId,
                ParentResourceName,
                ResourceTypeName,
                PluginName,
            ],
            EntityKind::ResourceType => &[Id, Name, PluginName],
            EntityKind::ResourceGroup => &[Id, Name, ResourceTypeName],
            EntityKind::Event => &[Id, ResourceId, Severity, Source, Detail],
            EntityKind::Bundle => &[Id, Name, BundleTypeName],
            EntityKind::BundleType => &[Id, Name],
            EntityKind::BundleVersion => &[Id, Name, BundleId, BundleName, Version],
            EntityKind::BundleDeployDefinition => &[Id, Name, BundleVersionId],
            EntityKind::BundleDeployment => &[Id, Name, DeployDefinitionId, ResourceId, Status],
            EntityKind::OperationHistory => &[Id, ResourceId, OperationName, Status],
            EntityKind::ConfigurationUpdate => &[Id, ResourceId, Status],
        }
    }

    pub fn recognizes(self, key: FilterKey) -> bool {
        self.recognized_filters().contains(&key)
    }
}

/// A filter value, either an identifier or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Id(EntityId),
    Text(String),
}

impl From<EntityId> for FilterValue {
    fn from(value: EntityId) -> Self {
        FilterValue::Id(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        FilterValue::Text(value.clone())
    }
}

/// One key/value pair of a frozen query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: FilterKey,
    pub value: FilterValue,
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageControl {
    pub page_number: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Mutable criteria builder for one entity kind.
#[derive(Debug, Clone)]
pub struct QueryCriteria {
    kind: EntityKind,
    filters: IndexMap<FilterKey, FilterValue>,
    case_sensitive: bool,
    strict: bool,
    page: Option<PageControl>,
    sort_by_name: Option<SortOrder>,
}

impl QueryCriteria {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filters: IndexMap::new(),
            case_sensitive: false,
            strict: false,
            page: None,
            sort_by_name: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Add a filter by its wire name.
    ///
    /// Fails with [`ClientError::InvalidFilter`] when the key is unknown, not
    /// recognized for this kind, or the value has the wrong type.
    pub fn add_filter(
        &mut self,
        key: &str,
        value: impl Into<FilterValue>,
    ) -> ClientResult<&mut Self> {
        let parsed = FilterKey::from_str(key)
            .map_err(|_| ClientError::invalid_filter(self.kind, key, "unknown filter key"))?;
        self.set_filter(parsed, value.into())
    }

    /// Add a filter by typed key.
    pub fn set_filter(&mut self, key: FilterKey, value: FilterValue) -> ClientResult<&mut Self> {
        if !self.kind.recognizes(key) {
            return Err(ClientError::invalid_filter(
                self.kind,
                key.to_string(),
                "not recognized for this entity kind",
            ));
        }
        match (&value, key.is_id_valued()) {
            (FilterValue::Id(_), false) => {
                return Err(ClientError::invalid_filter(
                    self.kind,
                    key.to_string(),
                    "expects a text value",
                ))
            }
            (FilterValue::Text(_), true) => {
                return Err(ClientError::invalid_filter(
                    self.kind,
                    key.to_string(),
                    "expects an id value",
                ))
            }
            _ => {}
        }
        if let Some(previous) = self.filters.insert(key, value) {
            debug!(kind = %self.kind, filter = %key, ?previous, "filter replaced");
        }
        Ok(self)
    }

    pub fn filter_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Id, id.into())
    }

    pub fn filter_name(&mut self, name: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Name, FilterValue::Text(name.into()))
    }

    pub fn filter_parent_resource_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::ParentResourceId, id.into())
    }

    pub fn filter_parent_resource_name(
        &mut self,
        name: impl Into<String>,
    ) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::ParentResourceName, FilterValue::Text(name.into()))
    }

    pub fn filter_resource_type_name(
        &mut self,
        name: impl Into<String>,
    ) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::ResourceTypeName, FilterValue::Text(name.into()))
    }

    pub fn filter_plugin_name(&mut self, name: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::PluginName, FilterValue::Text(name.into()))
    }

    pub fn filter_resource_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::ResourceId, id.into())
    }

    pub fn filter_severity(&mut self, severity: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Severity, FilterValue::Text(severity.into()))
    }

    pub fn filter_source(&mut self, source: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Source, FilterValue::Text(source.into()))
    }

    pub fn filter_detail(&mut self, detail: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Detail, FilterValue::Text(detail.into()))
    }

    pub fn filter_bundle_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::BundleId, id.into())
    }

    pub fn filter_bundle_name(&mut self, name: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::BundleName, FilterValue::Text(name.into()))
    }

    pub fn filter_bundle_version_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::BundleVersionId, id.into())
    }

    pub fn filter_deploy_definition_id(&mut self, id: EntityId) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::DeployDefinitionId, id.into())
    }

    pub fn filter_operation_name(&mut self, name: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::OperationName, FilterValue::Text(name.into()))
    }

    pub fn filter_status(&mut self, status: impl Into<String>) -> ClientResult<&mut Self> {
        self.set_filter(FilterKey::Status, FilterValue::Text(status.into()))
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    /// Restrict results to one zero-based page.
    pub fn set_paging(&mut self, page_number: u32, page_size: u32) -> ClientResult<&mut Self> {
        if page_size == 0 {
            return Err(ClientError::Validation(
                "page size must be greater than zero".into(),
            ));
        }
        self.page = Some(PageControl {
            page_number,
            page_size,
        });
        Ok(self)
    }

    pub fn set_sort_by_name(&mut self, order: SortOrder) -> &mut Self {
        self.sort_by_name = Some(order);
        self
    }

    /// Freeze the builder. The builder stays usable for further queries.
    pub fn build(&self) -> CriteriaQuery {
        CriteriaQuery {
            kind: self.kind,
            filters: self
                .filters
                .iter()
                .map(|(key, value)| Filter {
                    key: *key,
                    value: value.clone(),
                })
                .collect(),
            case_sensitive: self.case_sensitive,
            strict: self.strict,
            page: self.page,
            sort_by_name: self.sort_by_name,
        }
    }
}

/// Immutable query sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaQuery {
    kind: EntityKind,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    page: Option<PageControl>,
    #[serde(default)]
    sort_by_name: Option<SortOrder>,
}

impl CriteriaQuery {
    /// Unfiltered query over every entity of `kind`.
    pub fn all(kind: EntityKind) -> Self {
        QueryCriteria::new(kind).build()
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn filter(&self, key: FilterKey) -> Option<&FilterValue> {
        self.filters
            .iter()
            .find(|filter| filter.key == key)
            .map(|filter| &filter.value)
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn page(&self) -> Option<PageControl> {
        self.page
    }

    /// Re-check filter keys and value types. Used by the server side, which
    /// receives queries over the wire rather than through the builder.
    pub fn validate(&self) -> ClientResult<()> {
        let mut builder = QueryCriteria::new(self.kind);
        for filter in &self.filters {
            builder.set_filter(filter.key, filter.value.clone())?;
        }
        if let Some(page) = self.page {
            builder.set_paging(page.page_number, page.page_size)?;
        }
        Ok(())
    }

    /// Whether `entity` satisfies every filter.
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.kind == self.kind
            && self
                .filters
                .iter()
                .all(|filter| self.matches_filter(entity, filter))
    }

    /// Filter, sort and page a candidate set.
    pub fn apply<I>(&self, entities: I) -> Vec<Entity>
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut matched: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| self.matches(entity))
            .collect();

        if let Some(order) = self.sort_by_name {
            matched.sort_by(|a, b| {
                let by_name = a
                    .name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.id.cmp(&b.id));
                match order {
                    SortOrder::Ascending => by_name,
                    SortOrder::Descending => by_name.reverse(),
                }
            });
        }

        match self.page {
            Some(page) => {
                let size = page.page_size as usize;
                matched
                    .into_iter()
                    .skip(page.page_number as usize * size)
                    .take(size)
                    .collect()
            }
            None => matched,
        }
    }

    fn matches_filter(&self, entity: &Entity, filter: &Filter) -> bool {
        let attribute = filter.key.attribute(self.kind);
        match &filter.value {
            FilterValue::Id(wanted) => match attribute {
                Attribute::Id => entity.id == *wanted,
                Attribute::ParentId => entity.parent_id == Some(*wanted),
                Attribute::Property(name) => entity
                    .property(name)
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .is_some_and(|value| value == wanted.0),
                Attribute::Name | Attribute::ParentName | Attribute::TypeName => false,
            },
            FilterValue::Text(wanted) => {
                let candidate = match attribute {
                    Attribute::Name => Some(entity.name.as_str()),
                    Attribute::ParentName => entity.parent_name.as_deref(),
                    Attribute::TypeName => entity.type_name.as_deref(),
                    Attribute::Property(name) => entity.property(name),
                    Attribute::Id | Attribute::ParentId => None,
                };
                candidate.is_some_and(|value| self.text_matches(value, wanted))
            }
        }
    }

    fn text_matches(&self, candidate: &str, wanted: &str) -> bool {
        if self.case_sensitive {
            if self.strict {
                candidate == wanted
            } else {
                candidate.contains(wanted)
            }
        } else if self.strict {
            candidate.to_lowercase() == wanted.to_lowercase()
        } else {
            candidate.to_lowercase().contains(&wanted.to_lowercase())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: i64, name: &str, parent: (i64, &str)) -> Entity {
        Entity::new(EntityId(id), EntityKind::Resource, name)
            .with_parent(EntityId(parent.0), parent.1)
            .with_type("service-beta")
            .with_property(props::PLUGIN, "PerfTest")
    }

    fn inventory() -> Vec<Entity> {
        vec![
            service(10, "service-beta-0", (2, "server-omega-0")),
            service(11, "service-beta-1", (2, "server-omega-0")),
            service(12, "service-beta-0", (3, "server-omega-1")),
            service(13, "service-beta-10", (3, "server-omega-1")),
        ]
    }

    #[test]
    fn filters_combine_as_conjunction() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria
            .filter_name("service-beta-0")
            .unwrap()
            .filter_parent_resource_name("server-omega-0")
            .unwrap();
        let found = criteria.build().apply(inventory());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, EntityId(10));
    }

    #[test]
    fn non_strict_matches_substrings_case_insensitively() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria.filter_name("SERVICE-BETA-1").unwrap();
        let found = criteria.build().apply(inventory());
        let ids: Vec<_> = found.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![11, 13]);
    }

    #[test]
    fn strict_requires_equality() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria.filter_name("service-beta-1").unwrap().set_strict(true);
        let found = criteria.build().apply(inventory());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, EntityId(11));
    }

    #[test]
    fn case_sensitive_rejects_other_casing() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria
            .filter_name("SERVICE-BETA")
            .unwrap()
            .set_case_sensitive(true);
        assert!(criteria.build().apply(inventory()).is_empty());
    }

    #[test]
    fn last_write_wins_for_repeated_key() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria.filter_name("service-beta-10").unwrap();
        criteria.filter_name("service-beta-1").unwrap();
        let query = criteria.build();
        assert_eq!(query.filters().len(), 1);
        assert_eq!(
            query.filter(FilterKey::Name),
            Some(&FilterValue::Text("service-beta-1".into()))
        );
    }

    #[test]
    fn unknown_and_foreign_keys_are_rejected() {
        let mut criteria = QueryCriteria::new(EntityKind::Event);
        let err = criteria.add_filter("colour", "red").unwrap_err();
        assert!(matches!(err, ClientError::InvalidFilter { .. }));

        let err = criteria.add_filter("pluginName", "PerfTest").unwrap_err();
        match err {
            ClientError::InvalidFilter { kind, key, .. } => {
                assert_eq!(kind, EntityKind::Event);
                assert_eq!(key, "pluginName");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn value_type_must_match_key() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        assert!(criteria.add_filter("parentResourceId", "server").is_err());
        assert!(criteria.add_filter("name", EntityId(3)).is_err());
        assert!(criteria.add_filter("parentResourceId", EntityId(3)).is_ok());
    }

    #[test]
    fn parent_id_filter_is_exact() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria.filter_parent_resource_id(EntityId(3)).unwrap();
        let ids: Vec<_> = criteria
            .build()
            .apply(inventory())
            .into_iter()
            .map(|e| e.id.0)
            .collect();
        assert_eq!(ids, vec![12, 13]);
    }

    #[test]
    fn sort_then_page() {
        let mut criteria = QueryCriteria::new(EntityKind::Resource);
        criteria
            .set_sort_by_name(SortOrder::Descending)
            .set_paging(0, 2)
            .unwrap();
        let names: Vec<_> = criteria
            .build()
            .apply(inventory())
            .into_iter()
            .map(|e| (e.name, e.id.0))
            .collect();
        assert_eq!(
            names,
            vec![
                ("service-beta-10".to_owned(), 13),
                ("service-beta-1".to_owned(), 11)
            ]
        );

        criteria.set_paging(5, 2).unwrap();
        assert!(criteria.build().apply(inventory()).is_empty());
        assert!(criteria.set_paging(0, 0).is_err());
    }

    #[test]
    fn deployment_resource_filter_reads_property() {
        let deployment = Entity::new(EntityId(40), EntityKind::BundleDeployment, "deploy")
            .with_parent(EntityId(30), "definition")
            .with_property(props::RESOURCE_ID, "7");
        let mut criteria = QueryCriteria::new(EntityKind::BundleDeployment);
        criteria.filter_resource_id(EntityId(7)).unwrap();
        assert!(criteria.build().matches(&deployment));
        criteria.filter_resource_id(EntityId(30)).unwrap();
        assert!(!criteria.build().matches(&deployment));
    }

    #[test]
    fn frozen_query_survives_the_wire() {
        let mut criteria = QueryCriteria::new(EntityKind::Event);
        criteria
            .filter_resource_id(EntityId(4))
            .unwrap()
            .filter_severity("WARN")
            .unwrap();
        let query = criteria.build();
        let raw = serde_json::to_string(&query).unwrap();
        let back: CriteriaQuery = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, query);
        back.validate().unwrap();
    }
}
