//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Prometheus metrics for test outcomes and completion polling."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use rig_client::OperationDomain;

use crate::report::TestOutcome;

/// Shared registry type.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Metrics recorded by the runner and the completion poller.
#[derive(Clone, Debug)]
pub struct HarnessMetrics {
    registry: SharedRegistry,
    tests_total: IntCounterVec,
    polls_total: IntCounterVec,
    poll_timeouts_total: IntCounterVec,
    completion_wait_seconds: HistogramVec,
}

impl HarnessMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let tests_total = IntCounterVec::new(
            Opts::new("rig_tests_total", "Executed tests by script and outcome"),
            &["script", "outcome"],
        )?;
        registry.register(Box::new(tests_total.clone()))?;

        let polls_total = IntCounterVec::new(
            Opts::new(
                "rig_completion_polls_total",
                "Progress checks issued while waiting for asynchronous operations",
            ),
            &["domain"],
        )?;
        registry.register(Box::new(polls_total.clone()))?;

        let poll_timeouts_total = IntCounterVec::new(
            Opts::new(
                "rig_completion_timeouts_total",
                "Waits abandoned because the operation stayed in progress",
            ),
            &["domain"],
        )?;
        registry.register(Box::new(poll_timeouts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.025, 2.0, 14)
            .context("failed to construct completion wait buckets")?;
        let completion_wait_seconds = HistogramVec::new(
            HistogramOpts::new(
                "rig_completion_wait_seconds",
                "Time between the first progress check and the terminal state",
            )
            .buckets(buckets),
            &["domain", "state"],
        )?;
        registry.register(Box::new(completion_wait_seconds.clone()))?;

        Ok(Self {
            registry,
            tests_total,
            polls_total,
            poll_timeouts_total,
            completion_wait_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_test(&self, script: &str, outcome: TestOutcome) {
        self.tests_total
            .with_label_values(&[script, outcome.as_ref()])
            .inc();
    }

    pub fn inc_poll(&self, domain: OperationDomain) {
        self.polls_total
            .with_label_values(&[&domain.to_string()])
            .inc();
    }

    pub fn record_timeout(&self, domain: OperationDomain) {
        self.poll_timeouts_total
            .with_label_values(&[&domain.to_string()])
            .inc();
    }

    pub fn observe_completion(&self, domain: OperationDomain, succeeded: bool, waited: Duration) {
        let state = if succeeded { "succeeded" } else { "failed" };
        self.completion_wait_seconds
            .with_label_values(&[&domain.to_string(), state])
            .observe(waited.as_secs_f64());
    }

    pub fn tests_recorded(&self, script: &str, outcome: TestOutcome) -> u64 {
        self.tests_total
            .with_label_values(&[script, outcome.as_ref()])
            .get()
    }

    pub fn polls_recorded(&self, domain: OperationDomain) -> u64 {
        self.polls_total
            .with_label_values(&[&domain.to_string()])
            .get()
    }

    /// Render the registry in the prometheus text format.
    pub fn encode_text(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .context("failed to encode harness metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_as_text() {
        let metrics = HarnessMetrics::new(new_registry()).unwrap();
        metrics.record_test("events", TestOutcome::Passed);
        metrics.record_test("events", TestOutcome::Passed);
        metrics.inc_poll(OperationDomain::BundleDeployment);
        metrics.observe_completion(
            OperationDomain::BundleDeployment,
            true,
            Duration::from_millis(80),
        );

        assert_eq!(metrics.tests_recorded("events", TestOutcome::Passed), 2);
        assert_eq!(metrics.polls_recorded(OperationDomain::BundleDeployment), 1);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("rig_tests_total"));
        assert!(text.contains("rig_completion_wait_seconds"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = new_registry();
        HarnessMetrics::new(registry.clone()).unwrap();
        assert!(HarnessMetrics::new(registry).is_err());
    }
}
