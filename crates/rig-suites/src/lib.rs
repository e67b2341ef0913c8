//! ---
//! rig_section: "12-suites"
//! rig_subsection: "01-bootstrap"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Bundled integration scripts and lookup helpers."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
//! Integration scripts run against a server seeded with the PerfTest
//! inventory: `server-omega-N` servers carrying `service-alpha-N` and
//! `service-beta-N` services, plus at least one Windows platform.

use chrono::Utc;
use rig_client::{Entity, QueryCriteria};
use rig_testharness::{
    assert_not_null, assert_number_equals, HarnessResult, TestContext, TestScript,
};

pub mod bundles;
pub mod configuration;
pub mod events;

/// Every bundled script, in a stable order.
pub fn all() -> Vec<TestScript> {
    vec![configuration::script(), events::script(), bundles::script()]
}

pub fn by_name(name: &str) -> Option<TestScript> {
    all().into_iter().find(|script| script.name() == name)
}

/// Query resources and require exactly one match.
pub(crate) async fn find_single_resource(
    ctx: &TestContext,
    criteria: &QueryCriteria,
    what: &str,
) -> HarnessResult<Entity> {
    let found = ctx
        .resources()
        .find_resources_by_criteria(criteria.build())
        .await?;
    assert_number_equals(found.len(), 1, format!("expected exactly one {what}"))?;
    let resource = assert_not_null(found.into_iter().next(), format!("{what} not found"))?;
    Ok(resource)
}

/// A property value no earlier run can have written.
pub(crate) fn fresh_value() -> String {
    format!("updated property value -- {}", Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_addressable_by_name() {
        let names: Vec<_> = all().iter().map(|s| s.name().to_owned()).collect();
        assert_eq!(names, ["configuration", "events", "bundles"]);
        assert!(by_name("events").is_some());
        assert!(by_name("metrics").is_none());
    }
}
