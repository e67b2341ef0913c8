use std::sync::Arc;
use std::time::Duration;

use rig_client::{ClientError, Credentials, EntityId, ManagerProxy, Session};
use rig_sim::SimulatedServer;
use rig_testharness::{
    assert_equals, assert_number_equals, assert_true, new_registry, FailureKind, HarnessError, HarnessMetrics,
    PollPolicy, RunnerOptions, TestContext, TestFuture, TestOutcome, TestRunner, TestScript,
};

async fn login(sim: &Arc<SimulatedServer>) -> Session {
    Session::login(sim.clone(), Credentials::new("rigadmin", "rigadmin"))
        .await
        .unwrap()
}

fn options(relogin_on_expiry: bool) -> RunnerOptions {
    RunnerOptions {
        relogin_on_expiry,
        poll: PollPolicy::new(Duration::from_millis(25), Duration::from_secs(2)),
    }
}

fn failing_assertion(_ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        assert_equals("actual", "expected", "deliberate mismatch")?;
        Ok(())
    })
}

fn missing_entity(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        ctx.resources().get_resource(EntityId(1)).await?;
        Ok(())
    })
}

fn panicking(_ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let missing: Option<u8> = None;
        let _value = missing.expect("test body blew up");
        Ok(())
    })
}

fn session_still_usable(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        assert_true(ctx.session().is_active(), "session is active")?;
        let resources = ctx.resources();
        let mut criteria = resources.criteria();
        criteria.filter_name("server-omega-0")?;
        let found = resources.find_resources_by_criteria(criteria.build()).await?;
        assert_number_equals(found.len(), 1, "server lookup")?;
        Ok(())
    })
}

fn drop_session(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        ctx.session().logout().await?;
        ctx.resources().get_resource(EntityId(1)).await?;
        Ok(())
    })
}

fn register_server(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let resources = ctx.resources();
        let mut criteria = resources.criteria();
        criteria
            .filter_name("server-omega-1")?
            .set_strict(true);
        let server = resources
            .find_resources_by_criteria(criteria.build())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::MissingFixture("server-omega-1".into()))?;
        ctx.set_fixture("server", server);
        Ok(())
    })
}

fn broken_setup(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        ctx.fixture("never-registered")?;
        Ok(())
    })
}

fn uses_fixture(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let server = ctx.fixture("server")?;
        assert_equals(server.name.as_str(), "server-omega-1", "fixture name")?;
        Ok(())
    })
}

fn mixed_script() -> TestScript {
    TestScript::new("isolation")
        .with_test("failing_assertion", failing_assertion)
        .with_test("missing_entity", missing_entity)
        .with_test("panicking", panicking)
        .with_test("session_still_usable", session_still_usable)
}

#[tokio::test]
async fn failures_are_isolated_per_test() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(true));
    let report = runner.execute_all(&mixed_script()).await.unwrap();

    let outcomes: Vec<_> = report
        .results
        .iter()
        .map(|r| (r.name.as_str(), r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        [
            ("failing_assertion", TestOutcome::Failed),
            ("missing_entity", TestOutcome::Errored),
            ("panicking", TestOutcome::Errored),
            ("session_still_usable", TestOutcome::Passed),
        ]
    );

    let assertion = report.result("failing_assertion").unwrap().failure.clone().unwrap();
    assert_eq!(assertion.actual.as_deref(), Some("\"actual\""));
    assert_eq!(assertion.expected.as_deref(), Some("\"expected\""));
    assert_eq!(
        report.result("missing_entity").unwrap().failure.as_ref().unwrap().kind,
        FailureKind::Domain
    );
    let panic = report.result("panicking").unwrap();
    assert!(panic.message().contains("test body blew up"));

    let summary = report.summary();
    assert_eq!((summary.passed, summary.failed, summary.errored), (1, 1, 2));
    assert!(report.aborted.is_none());
}

#[tokio::test]
async fn subset_runs_in_caller_order_and_rejects_unknown_names() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(true));
    let script = mixed_script();

    let report = runner
        .execute_subset(&script, &["session_still_usable", "failing_assertion"])
        .await
        .unwrap();
    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["session_still_usable", "failing_assertion"]);

    let calls_before = sim.total_calls();
    let err = runner
        .execute_subset(&script, &["failing_assertion", "no_such_test"])
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::UnknownTest { ref name, .. } if name == "no_such_test"));
    assert_eq!(sim.total_calls(), calls_before);
}

#[tokio::test]
async fn expired_session_is_recovered_when_allowed() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(true));
    let script = TestScript::new("expiry")
        .with_test("drop_session", drop_session)
        .with_test("session_still_usable", session_still_usable);

    let report = runner.execute_all(&script).await.unwrap();
    let dropped = report.result("drop_session").unwrap();
    assert_eq!(dropped.outcome, TestOutcome::Errored);
    assert_eq!(dropped.failure.as_ref().unwrap().kind, FailureKind::Session);
    assert_eq!(
        report.result("session_still_usable").unwrap().outcome,
        TestOutcome::Passed
    );
    assert!(runner.session().is_active());
}

#[tokio::test]
async fn expired_session_aborts_without_relogin() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(false));
    let script = TestScript::new("expiry")
        .with_test("drop_session", drop_session)
        .with_test("session_still_usable", session_still_usable)
        .with_test("failing_assertion", failing_assertion);

    let report = runner.execute_all(&script).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.not_run, ["session_still_usable", "failing_assertion"]);
    assert!(report
        .aborted
        .as_deref()
        .unwrap()
        .contains("session expired"));
    assert!(!report.is_success());
}

#[tokio::test]
async fn setup_registers_fixtures_for_tests() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(true));
    let script = TestScript::new("fixtures")
        .with_setup(register_server)
        .with_test("uses_fixture", uses_fixture);

    let report = runner.execute_all(&script).await.unwrap();
    assert!(report.is_success(), "{report}");
}

#[tokio::test]
async fn failed_setup_errors_every_selected_test() {
    let sim = Arc::new(SimulatedServer::default());
    let runner = TestRunner::new(login(&sim).await, options(true));
    let script = TestScript::new("fixtures")
        .with_setup(broken_setup)
        .with_test("uses_fixture", uses_fixture)
        .with_test("session_still_usable", session_still_usable);

    let report = runner.execute_all(&script).await.unwrap();
    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert_eq!(result.outcome, TestOutcome::Errored);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Setup);
        assert!(failure.message.contains("never-registered"));
    }
}

#[tokio::test]
async fn overlapping_runs_on_one_session_are_refused() {
    let sim = Arc::new(SimulatedServer::default());
    let session = login(&sim).await;
    let runner = TestRunner::new(session.clone(), options(true));

    let lease = session.begin_run().unwrap();
    let err = runner.execute_all(&mixed_script()).await.unwrap_err();
    assert_eq!(err, HarnessError::Client(ClientError::SessionInUse));
    drop(lease);

    assert!(runner.execute_all(&mixed_script()).await.is_ok());
}

#[tokio::test]
async fn outcomes_are_counted_in_metrics() {
    let sim = Arc::new(SimulatedServer::default());
    let metrics = HarnessMetrics::new(new_registry()).unwrap();
    let runner = TestRunner::new(login(&sim).await, options(true)).with_metrics(metrics.clone());
    runner.execute_all(&mixed_script()).await.unwrap();

    assert_eq!(metrics.tests_recorded("isolation", TestOutcome::Passed), 1);
    assert_eq!(metrics.tests_recorded("isolation", TestOutcome::Failed), 1);
    assert_eq!(metrics.tests_recorded("isolation", TestOutcome::Errored), 2);
}
