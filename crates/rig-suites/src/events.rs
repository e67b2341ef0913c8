//! ---
//! rig_section: "12-suites"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Event generation and event query script."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use rig_client::model::props;
use rig_client::{Configuration, Entity, ManagerProxy, Mutation, OperationSchedule};
use rig_testharness::{
    assert_equals, assert_true, AssertionFailure, HarnessResult, TestContext, TestFuture,
    TestScript,
};
use rig_logging::rig_debug;

use crate::find_single_resource;

pub const SCRIPT: &str = "events";

const CREATE_EVENTS: &str = "createEvents";

/// Fixture name and the severity fired at it.
const TARGETS: [(&str, &str); 3] = [
    ("service-alpha-0", "WARNING"),
    ("service-alpha-1", "ERROR"),
    ("service-beta-0", "FATAL"),
];

pub fn script() -> TestScript {
    TestScript::new(SCRIPT)
        .with_description("Fires events at services and finds them by resource")
        .with_setup(setup)
        .with_test("filter_by_resource", filter_by_resource)
        .with_test("filter_by_severity", filter_by_severity)
}

fn event_parameters(resource: &Entity, severity: &str, count: u32) -> Configuration {
    Configuration::new()
        .with("source", &resource.name)
        .with("details", format!("Test event for {}", resource.name))
        .with("severity", severity)
        .with("count", count)
}

/// Schedule `createEvents` on `resource` and wait for it to finish.
async fn fire_event(ctx: &TestContext, resource: &Entity, severity: &str) -> HarnessResult<()> {
    let operations = ctx.operations();
    let schedule = OperationSchedule::immediate(CREATE_EVENTS)
        .with_parameters(event_parameters(resource, severity, 1))
        .with_description(format!("Test script event for {}", resource.name));
    let pending = match operations
        .schedule_resource_operation(resource.id, schedule)
        .await?
    {
        Mutation::Pending(pending) => pending,
        Mutation::Applied(_) => {
            return Err(AssertionFailure::new("expected a pending operation").into())
        }
    };
    let completion = ctx.await_completion(&operations, &pending).await?;
    assert_true(
        completion.is_success(),
        format!(
            "{CREATE_EVENTS} failed on {}: {}",
            resource.name,
            completion.failure_message().unwrap_or("no reason given")
        ),
    )?;
    let entity = resource.reference();
    rig_debug!(
        context = ctx.log_context().with_entity(&entity),
        "{severity} event fired after {} polls",
        completion.polls
    );
    Ok(())
}

fn setup(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let mut criteria = ctx.resources().criteria();
        criteria.filter_name("server-omega-0")?;
        let server = find_single_resource(ctx, &criteria, "resource named 'server-omega-0'").await?;

        for (name, severity) in TARGETS {
            let mut criteria = ctx.resources().criteria();
            criteria
                .filter_name(name)?
                .filter_parent_resource_id(server.id)?;
            let service = find_single_resource(
                ctx,
                &criteria,
                &format!("service named '{name}' having parent '{}'", server.name),
            )
            .await?;
            fire_event(ctx, &service, severity).await?;
            ctx.set_fixture(name, service);
        }
        ctx.set_fixture("server", server);
        Ok(())
    })
}

async fn events_for(ctx: &TestContext, resource: &Entity) -> HarnessResult<Vec<Entity>> {
    let events = ctx.events();
    let mut criteria = events.criteria();
    criteria.filter_resource_id(resource.id)?;
    Ok(events.find_events_by_criteria(criteria.build()).await?)
}

fn filter_by_resource(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        for (name, _) in TARGETS {
            let resource = ctx.fixture(name)?;
            let events = events_for(ctx, resource).await?;
            assert_true(
                !events.is_empty(),
                format!(
                    "Expected to find events when filtering by resource id for {}",
                    resource.reference()
                ),
            )?;
            assert_true(
                events.iter().all(|event| event.parent_id == Some(resource.id)),
                "resource filter returned events of another resource",
            )?;
        }
        Ok(())
    })
}

fn filter_by_severity(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        for (name, severity) in TARGETS {
            let resource = ctx.fixture(name)?;
            let events = ctx.events();
            let mut criteria = events.criteria();
            criteria
                .filter_resource_id(resource.id)?
                .filter_severity(severity)?
                .set_strict(true);
            let matching = events.find_events_by_criteria(criteria.build()).await?;
            assert_true(
                !matching.is_empty(),
                format!("no {severity} events for {name}"),
            )?;
            for event in &matching {
                assert_equals(
                    event.property(props::SEVERITY),
                    Some(severity),
                    format!("severity of {}", event.reference()),
                )?;
            }
        }
        Ok(())
    })
}
