//! ---
//! rig_section: "15-testing-qa-runbook"
//! rig_subsection: "integration-tests"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "End-to-end scenarios over session, criteria, proxies and poller."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::{Duration, Instant};

use rig_client::remote::rpc;
use rig_client::{
    ClientError, Credentials, DeleteOutcome, ManagerProxy, Mutation, OperationDomain, Session,
};
use rig_sim::{SimOptions, SimulatedServer};
use rig_testharness::{CompletionPoller, HarnessError, PollPolicy, MIN_POLL_INTERVAL};

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
async fn scenario_a_configuration_update_is_visible_after_completion() {
    let sim = server(60);
    let session = login(&sim).await;
    let resources = session.resource_proxy();

    let mut criteria = resources.criteria();
    criteria
        .add_filter("name", "service-beta-1")
        .unwrap()
        .add_filter("parentResourceName", "server-omega-1")
        .unwrap();
    let found = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let service = &found[0];

    let configuration = session.configuration_proxy();
    let mut config = configuration
        .get_resource_configuration(service.id)
        .await
        .unwrap();
    config
        .get_simple_mut("beta-config0")
        .unwrap()
        .set_string_value("scenario a value");

    let pending = match configuration
        .update_resource_configuration(service.id, &config)
        .await
        .unwrap()
    {
        Mutation::Pending(pending) => pending,
        Mutation::Applied(_) => panic!("resource configuration updates are asynchronous"),
    };
    let poller = CompletionPoller::new(PollPolicy::new(
        Duration::from_millis(25),
        Duration::from_secs(5),
    ));
    let completion = poller
        .await_completion(&configuration, &pending)
        .await
        .unwrap();
    assert!(completion.is_success());
    assert_eq!(
        completion.settled.simple_value("beta-config0"),
        Some("scenario a value")
    );

    let reloaded = configuration
        .get_resource_configuration(service.id)
        .await
        .unwrap();
    assert_eq!(reloaded.simple_value("beta-config0"), Some("scenario a value"));
}

#[tokio::test]
async fn scenario_b_unknown_filter_key_is_rejected_before_any_call() {
    let sim = server(10);
    let session = login(&sim).await;
    let calls = sim.total_calls();

    let mut criteria = session.resource_proxy().criteria();
    let err = criteria.add_filter("colour", "blue").unwrap_err();
    assert!(matches!(err, ClientError::InvalidFilter { ref key, .. } if key == "colour"));

    // Known key, but not one events recognise.
    let mut criteria = session.event_proxy().criteria();
    let err = criteria.add_filter("pluginName", "PerfTest").unwrap_err();
    assert!(matches!(err, ClientError::InvalidFilter { .. }));

    assert_eq!(sim.total_calls(), calls);
}

#[tokio::test]
async fn scenario_c_no_matches_is_an_empty_result() {
    let sim = server(10);
    let session = login(&sim).await;
    let resources = session.resource_proxy();

    let mut criteria = resources.criteria();
    criteria.filter_name("service-gamma-42").unwrap();
    let found = resources
        .find_resources_by_criteria(criteria.build())
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn scenario_d_delete_missing_bundle_then_create() {
    let sim = server(10);
    let session = login(&sim).await;
    let bundles = session.bundle_proxy();

    let outcome = bundles.delete_bundle_by_name("scenarioBundle").await.unwrap();
    assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);

    let bundle_type = bundles
        .get_bundle_type_by_name("File Template Bundle")
        .await
        .unwrap()
        .unwrap();
    let bundle = bundles
        .create_bundle("scenarioBundle", bundle_type.id, None)
        .await
        .unwrap();
    assert_eq!(bundle.name, "scenarioBundle");

    assert_eq!(
        bundles.delete_bundle_by_name("scenarioBundle").await.unwrap(),
        DeleteOutcome::Deleted
    );
}

#[tokio::test]
async fn scenario_e_zero_interval_is_not_a_busy_loop() {
    let sim = server(10);
    sim.stall(OperationDomain::ResourceConfiguration);
    let session = login(&sim).await;
    let resources = session.resource_proxy();
    let configuration = session.configuration_proxy();

    let mut criteria = resources.criteria();
    criteria.filter_name("service-beta-3").unwrap();
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

    let timeout = Duration::from_millis(300);
    let before = sim.call_count(rpc::OPERATION_STATUS);
    let started = Instant::now();
    let err = CompletionPoller::new(PollPolicy::new(Duration::ZERO, timeout))
        .await_completion(&configuration, &pending)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();
    let checks = sim.call_count(rpc::OPERATION_STATUS) - before;

    assert!(matches!(err, HarnessError::PollingTimeout { .. }));
    assert!(elapsed >= timeout);
    let bound = (timeout.as_millis() / MIN_POLL_INTERVAL.as_millis()) as u64 + 2;
    assert!(checks <= bound, "{checks} status checks in {elapsed:?}");
}
