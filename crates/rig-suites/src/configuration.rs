//! ---
//! rig_section: "12-suites"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Resource, plugin and group configuration script."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use rig_client::{ManagerProxy, Mutation, MutationMode};
use rig_logging::rig_info;
use rig_testharness::{
    assert_equals, assert_not_null, assert_number_equals, assert_true, AssertionFailure,
    TestContext, TestFuture, TestScript,
};

use crate::{find_single_resource, fresh_value};

pub const SCRIPT: &str = "configuration";

const RESOURCE_TARGET: &str = "resource_target";
const PLUGIN_TARGET: &str = "plugin_target";
const RESOURCE_PROPERTY: &str = "beta-config0";
const PLUGIN_PROPERTY: &str = "beta-property0";
const BETA_TYPE: &str = "service-beta";
const PERF_PLUGIN: &str = "PerfTest";

pub fn script() -> TestScript {
    TestScript::new(SCRIPT)
        .with_description("Updates resource and plugin configuration on beta services")
        .with_setup(setup)
        .with_test("update_resource_configuration", update_resource_configuration)
        .with_test("update_plugin_configuration", update_plugin_configuration)
        .with_test(
            "update_resource_group_configuration",
            update_resource_group_configuration,
        )
}

fn setup(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let mut criteria = ctx.resources().criteria();
        criteria
            .filter_name("service-beta-1")?
            .filter_parent_resource_name("server-omega-1")?;
        let resource_target =
            find_single_resource(ctx, &criteria, "service-beta-1 under server-omega-1").await?;

        let mut criteria = ctx.resources().criteria();
        criteria
            .filter_name("service-beta-0")?
            .filter_parent_resource_name("server-omega-0")?;
        let plugin_target =
            find_single_resource(ctx, &criteria, "service-beta-0 under server-omega-0").await?;

        ctx.set_fixture(RESOURCE_TARGET, resource_target);
        ctx.set_fixture(PLUGIN_TARGET, plugin_target);
        Ok(())
    })
}

fn update_resource_configuration(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let resource = ctx.fixture(RESOURCE_TARGET)?.clone();
        let configuration = ctx.configuration();
        assert_equals(
            configuration
                .capabilities()
                .mode_of("update_resource_configuration"),
            Some(MutationMode::Async),
            "resource configuration updates complete asynchronously",
        )?;

        let mut config = configuration.get_resource_configuration(resource.id).await?;
        let value = fresh_value();
        assert_not_null(
            config.get_simple_mut(RESOURCE_PROPERTY),
            format!("{RESOURCE_PROPERTY} missing from {}", resource.name),
        )?
        .set_string_value(&value);

        let pending = match configuration
            .update_resource_configuration(resource.id, &config)
            .await?
        {
            Mutation::Pending(pending) => pending,
            Mutation::Applied(_) => {
                return Err(AssertionFailure::new("expected a pending configuration update").into())
            }
        };
        let completion = ctx.await_completion(&configuration, &pending).await?;
        assert_true(
            completion.is_success(),
            format!(
                "configuration update failed: {}",
                completion.failure_message().unwrap_or("no reason given")
            ),
        )?;
        let entity = resource.reference();
        rig_info!(
            context = ctx.log_context().with_entity(&entity),
            "configuration update settled after {} polls",
            completion.polls
        );

        assert_true(
            !configuration
                .is_resource_configuration_update_in_progress(resource.id)
                .await?,
            "update still reported in progress after completion",
        )?;
        let reloaded = configuration.get_resource_configuration(resource.id).await?;
        assert_equals(
            reloaded.simple_value(RESOURCE_PROPERTY),
            Some(value.as_str()),
            "Failed to update resource configuration",
        )?;
        Ok(())
    })
}

fn update_plugin_configuration(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let resource = ctx.fixture(PLUGIN_TARGET)?.clone();
        let configuration = ctx.configuration();

        let mut plugin_config = configuration.get_plugin_configuration(resource.id).await?;
        let value = fresh_value();
        assert_not_null(
            plugin_config.get_simple_mut(PLUGIN_PROPERTY),
            format!("{PLUGIN_PROPERTY} missing from {}", resource.name),
        )?
        .set_string_value(&value);

        let applied = configuration
            .update_plugin_configuration(resource.id, &plugin_config)
            .await?;
        assert_true(
            !applied.is_pending(),
            "plugin configuration updates apply immediately",
        )?;

        let reloaded = configuration.get_plugin_configuration(resource.id).await?;
        assert_equals(
            reloaded.simple_value(PLUGIN_PROPERTY),
            Some(value.as_str()),
            "Failed to update plugin configuration",
        )?;
        Ok(())
    })
}

fn update_resource_group_configuration(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let resource_type = ctx
            .resource_types()
            .get_resource_type_by_name_and_plugin(BETA_TYPE, PERF_PLUGIN)
            .await?;
        let resource_type = assert_not_null(
            resource_type,
            "Failed to find resource type for new resource group.",
        )?;

        let groups = ctx.groups();
        let group_name = format!("service-beta-group -- {}", chrono::Utc::now().to_rfc3339());
        let group = groups
            .create_resource_group(&group_name, Some(resource_type.id))
            .await?;

        let resources = ctx.resources();
        let mut criteria = resources.criteria();
        criteria
            .filter_parent_resource_name("server-omega-0")?
            .filter_resource_type_name(BETA_TYPE)?
            .set_case_sensitive(true)
            .set_strict(true);
        let services = resources.find_resources_by_criteria(criteria.build()).await?;
        assert_number_equals(services.len(), 10, "Failed to find beta services")?;

        let configuration = ctx.configuration();
        let mut loaded = 0usize;
        for service in &services {
            let config = configuration.get_resource_configuration(service.id).await?;
            if config.get_simple(RESOURCE_PROPERTY).is_some() {
                loaded += 1;
            }
        }
        assert_number_equals(loaded, 10, "Failed to load all resource configurations")?;

        groups.delete_resource_group(group.id).await?;
        Ok(())
    })
}
