//! ---
//! rig_section: "15-testing-qa-runbook"
//! rig_subsection: "integration-tests"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Properties every criteria query, completion wait and run must hold."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use rig_client::{Credentials, ManagerProxy, OperationDomain, Session, SortOrder};
use rig_sim::{SimOptions, SimulatedServer};
use rig_testharness::{
    assert_equals, assert_number_equals, assert_true, CompletionPoller, HarnessError, PollPolicy,
    RunnerOptions, TestContext, TestFuture, TestOutcome, TestRunner, TestScript,
};

fn server(delay_ms: u64) -> Arc<SimulatedServer> {
    Arc::new(SimulatedServer::new(
        SimOptions::default().with_completion_delay(Duration::from_millis(delay_ms)),
    ))
}

async fn login(sim: &Arc<SimulatedServer>) -> Session {
    Session::login(sim.clone(), Credentials::new("rigadmin", "rigadmin"))
        .await
        .expect("login")
}

#[tokio::test]
async fn criteria_filters_are_a_conjunction() {
    let sim = server(10);
    let session = login(&sim).await;
    let resources = session.resource_proxy();

    let mut criteria = resources.criteria();
    criteria
        .filter_parent_resource_name("server-omega-0")
        .unwrap()
        .filter_resource_type_name("service-beta")
        .unwrap()
        .filter_name("service-beta-1")
        .unwrap();
    let found = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    for resource in &found {
        assert_eq!(resource.parent_name.as_deref(), Some("server-omega-0"));
        assert_eq!(resource.type_name.as_deref(), Some("service-beta"));
        assert!(resource.name.contains("service-beta-1"));
    }

    // Each filter alone matches something; together nothing does.
    let mut criteria = resources.criteria();
    criteria
        .filter_name("service-alpha-1")
        .unwrap()
        .filter_resource_type_name("service-beta")
        .unwrap();
    let found = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn repeated_queries_return_equal_sequences() {
    let sim = server(10);
    let session = login(&sim).await;
    let resources = session.resource_proxy();

    let mut criteria = resources.criteria();
    criteria
        .filter_resource_type_name("service")
        .unwrap()
        .set_sort_by_name(SortOrder::Ascending);
    let query = criteria.build();
    let first = resources
        .find_resources_by_criteria(query.clone())
        .await
        .unwrap();
    let second = resources.find_resources_by_criteria(query).await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn completion_is_never_reported_while_in_progress() {
    let delay = Duration::from_millis(120);
    let sim = server(delay.as_millis() as u64);
    let session = login(&sim).await;
    let resources = session.resource_proxy();
    let configuration = session.configuration_proxy();

    let mut criteria = resources.criteria();
    criteria.filter_name("service-beta-2").unwrap();
    let service = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap()
        .remove(0);
    let config = configuration
        .get_resource_configuration(service.id)
        .await
        .unwrap();

    let submitted = Instant::now();
    let mutation = configuration
        .update_resource_configuration(service.id, &config)
        .await
        .unwrap();
    let pending = mutation.pending().cloned().unwrap();
    assert!(configuration
        .is_resource_configuration_update_in_progress(service.id)
        .await
        .unwrap());

    let completion = CompletionPoller::new(PollPolicy::new(
        Duration::from_millis(25),
        Duration::from_secs(5),
    ))
    .await_completion(&configuration, &pending)
    .await
    .unwrap();

    assert!(submitted.elapsed() >= delay);
    assert!(completion.is_success());
    assert!(completion.polls >= 1);
    assert!(!configuration
        .is_resource_configuration_update_in_progress(service.id)
        .await
        .unwrap());
}

#[tokio::test]
async fn stalled_operation_times_out_within_one_interval_of_the_deadline() {
    let sim = server(10);
    sim.stall(OperationDomain::ResourceConfiguration);
    let session = login(&sim).await;
    let resources = session.resource_proxy();
    let configuration = session.configuration_proxy();

    let mut criteria = resources.criteria();
    criteria.filter_name("service-beta-4").unwrap();
    let service = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap()
        .remove(0);
    let config = configuration
        .get_resource_configuration(service.id)
        .await
        .unwrap();
    let pending = configuration
        .update_resource_configuration(service.id, &config)
        .await
        .unwrap()
        .pending()
        .cloned()
        .unwrap();

    let interval = Duration::from_millis(50);
    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let err = CompletionPoller::new(PollPolicy::new(interval, timeout))
        .await_completion(&configuration, &pending)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    match err {
        HarnessError::PollingTimeout { waited, polls, .. } => {
            assert!(waited >= timeout);
            assert!(polls >= 2);
        }
        other => panic!("expected a polling timeout, got {other}"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + interval + Duration::from_millis(500));

    sim.clear_fault(OperationDomain::ResourceConfiguration);
    let completion = CompletionPoller::new(PollPolicy::new(interval, Duration::from_secs(5)))
        .await_completion(&configuration, &pending)
        .await
        .unwrap();
    assert!(completion.is_success());
}

fn failing_assertion(_ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        assert_equals("observed", "wanted", "deliberate mismatch")?;
        Ok(())
    })
}

fn session_still_valid(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        assert_true(ctx.session().is_active(), "session is active")?;
        let resources = ctx.resources();
        let mut criteria = resources.criteria();
        criteria.filter_name("server-omega-1")?.set_strict(true);
        let found = resources.find_resources_by_criteria(criteria.build()).await?;
        assert_number_equals(found.len(), 1, "server lookup after a failed test")?;
        Ok(())
    })
}

#[tokio::test]
async fn failing_test_never_blocks_the_next_one() {
    let sim = server(10);
    let runner = TestRunner::new(login(&sim).await, RunnerOptions::default());
    let script = TestScript::new("isolation-law")
        .with_test("failing_assertion", failing_assertion)
        .with_test("session_still_valid", session_still_valid)
        .with_test("failing_again", failing_assertion)
        .with_test("still_valid_again", session_still_valid);

    let report = runner.execute_all(&script).await.unwrap();
    let outcomes: Vec<_> = report.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        [
            TestOutcome::Failed,
            TestOutcome::Passed,
            TestOutcome::Failed,
            TestOutcome::Passed
        ]
    );
    assert!(report.not_run.is_empty());
}
