use std::sync::Arc;
use std::time::Duration;

use rig_client::{Credentials, OperationDomain, Session};
use rig_sim::{SimOptions, SimulatedServer};
use rig_testharness::{FailureKind, PollPolicy, RunReport, RunnerOptions, TestOutcome, TestRunner, TestScript};

fn fast_server() -> Arc<SimulatedServer> {
    Arc::new(SimulatedServer::new(
        SimOptions::default().with_completion_delay(Duration::from_millis(10)),
    ))
}

async fn run(sim: &Arc<SimulatedServer>, script: &TestScript, timeout: Duration) -> RunReport {
    let session = Session::login(sim.clone(), Credentials::new("rigadmin", "rigadmin"))
        .await
        .unwrap();
    let options = RunnerOptions {
        relogin_on_expiry: false,
        poll: PollPolicy::new(Duration::from_millis(25), timeout),
    };
    TestRunner::new(session, options)
        .execute_all(script)
        .await
        .unwrap()
}

#[tokio::test]
async fn every_bundled_script_passes_against_a_healthy_server() {
    let sim = fast_server();
    for script in rig_suites::all() {
        let report = run(&sim, &script, Duration::from_secs(5)).await;
        assert!(report.is_success(), "{report}");
        assert_eq!(report.results.len(), script.len());
    }
    assert_eq!(sim.pending_jobs(), 0);
}

#[tokio::test]
async fn scripts_can_be_rerun_on_the_same_server() {
    let sim = fast_server();
    let script = rig_suites::by_name("bundles").unwrap();
    for _ in 0..2 {
        let report = run(&sim, &script, Duration::from_secs(5)).await;
        assert!(report.is_success(), "{report}");
    }
}

#[tokio::test]
async fn failed_event_operations_error_the_events_script() {
    let sim = fast_server();
    sim.fail_operations(OperationDomain::ResourceOperation, "agent unreachable");
    let script = rig_suites::by_name("events").unwrap();

    let report = run(&sim, &script, Duration::from_secs(5)).await;
    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert_eq!(result.outcome, TestOutcome::Errored);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Setup);
        assert!(failure.message.contains("agent unreachable"), "{failure}");
    }
}

#[tokio::test]
async fn stalled_deployment_is_reported_as_polling_timeout() {
    let sim = fast_server();
    sim.stall(OperationDomain::BundleDeployment);
    let script = rig_suites::bundles::script();

    let report = run(&sim, &script, Duration::from_millis(200)).await;
    let deploy = report.result("deploy_bundle").unwrap();
    assert_eq!(deploy.outcome, TestOutcome::Errored);
    assert_eq!(
        deploy.failure.as_ref().unwrap().kind,
        FailureKind::PollingTimeout
    );
    assert_eq!(
        report.result("duplicate_bundle_is_rejected").unwrap().outcome,
        TestOutcome::Passed
    );
}
