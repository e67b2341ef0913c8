//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Sequential test runner with per-test fault isolation."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use rig_client::Session;
use rig_common::HarnessConfig;
use rig_logging::{log_test_event, rig_error, rig_warn, TestEventOutcome};
use tracing::info;

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::metrics::HarnessMetrics;
use crate::poller::{CompletionPoller, PollPolicy};
use crate::report::{FailureDetail, FailureKind, RunReport, TestOutcome, TestResult};
use crate::script::{TestFn, TestScript};

#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// Re-authenticate after a test fails with an expired session instead
    /// of aborting the run.
    pub relogin_on_expiry: bool,
    pub poll: PollPolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            relogin_on_expiry: true,
            poll: PollPolicy::default(),
        }
    }
}

impl RunnerOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            relogin_on_expiry: config.runner.relogin_on_expiry,
            poll: PollPolicy::from(&config.polling),
        }
    }
}

/// Why a guarded test body did not return `Ok`.
enum Fault {
    Error(HarnessError),
    Panic(String),
}

impl Fault {
    fn detail(&self) -> FailureDetail {
        match self {
            Fault::Error(err) => FailureDetail::from_error(err),
            Fault::Panic(message) => FailureDetail::new(FailureKind::Panic, message.clone()),
        }
    }

    fn fatal(&self) -> Option<&HarnessError> {
        match self {
            Fault::Error(err) if err.is_fatal_to_run() => Some(err),
            _ => None,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}

async fn run_guarded(test: TestFn, ctx: &mut TestContext) -> Result<(), Fault> {
    match AssertUnwindSafe(test(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Fault::Error(err)),
        Err(payload) => Err(Fault::Panic(panic_message(payload))),
    }
}

/// Runs a script's tests one after another over a single session.
///
/// A test that fails or errors never stops the next one. Only
/// authentication and session failures end the run early, and an expired
/// session is first re-established when the options allow it.
#[derive(Debug, Clone)]
pub struct TestRunner {
    session: Session,
    options: RunnerOptions,
    metrics: Option<HarnessMetrics>,
}

impl TestRunner {
    pub fn new(session: Session, options: RunnerOptions) -> Self {
        Self {
            session,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: HarnessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run every test in declaration order.
    pub async fn execute_all(&self, script: &TestScript) -> HarnessResult<RunReport> {
        self.execute(script, script.all()).await
    }

    /// Run the named tests in the given order. Unknown names fail before
    /// anything runs.
    pub async fn execute_subset<S: AsRef<str>>(
        &self,
        script: &TestScript,
        names: &[S],
    ) -> HarnessResult<RunReport> {
        let selected = script.select(names)?;
        self.execute(script, selected).await
    }

    async fn execute(
        &self,
        script: &TestScript,
        selected: Vec<(String, TestFn)>,
    ) -> HarnessResult<RunReport> {
        let _lease = self.session.begin_run()?;
        let mut poller = CompletionPoller::new(self.options.poll);
        if let Some(metrics) = &self.metrics {
            poller = poller.with_metrics(metrics.clone());
        }
        let mut ctx = TestContext::new(self.session.clone(), poller, script.name());
        let mut report = RunReport::new(script.name(), self.session.username());
        info!(script = script.name(), tests = selected.len(), "run started");

        if let Some(setup) = script.setup() {
            let started_at = Utc::now();
            let clock = Instant::now();
            if let Err(fault) = run_guarded(setup, &mut ctx).await {
                let detail = fault.detail();
                rig_error!(context = ctx.log_context(), "setup failed: {}", detail.message);
                if fault.fatal().is_some() {
                    report.abort(
                        format!("setup: {}", detail.message),
                        selected.into_iter().map(|(name, _)| name),
                    );
                } else {
                    let setup_detail = FailureDetail::new(
                        FailureKind::Setup,
                        format!("setup failed: {}", detail.message),
                    );
                    for (name, _) in selected {
                        self.record(
                            &mut report,
                            TestResult::failed(name, setup_detail.clone(), started_at, clock.elapsed()),
                        );
                    }
                }
                report.finish();
                return Ok(report);
            }
        }

        let mut queue = selected.into_iter();
        while let Some((name, test)) = queue.next() {
            ctx.enter_test(Some(name.as_str()));
            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = run_guarded(test, &mut ctx).await;
            let duration = clock.elapsed();

            let result = match &outcome {
                Ok(()) => TestResult::passed(name.as_str(), started_at, duration),
                Err(fault) => TestResult::failed(name.as_str(), fault.detail(), started_at, duration),
            };
            self.record(&mut report, result);

            if let Err(fault) = outcome {
                if let Some(err) = fault.fatal() {
                    if let Err(reason) = self.recover(err).await {
                        rig_warn!(context = ctx.log_context(), "run aborted: {reason}");
                        report.abort(reason, queue.map(|(name, _)| name));
                        break;
                    }
                }
            }
        }
        ctx.enter_test(None);
        report.finish();

        let summary = report.summary();
        info!(
            script = script.name(),
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            not_run = summary.not_run,
            "run finished"
        );
        Ok(report)
    }

    /// Decide whether the run survives a fatal error.
    async fn recover(&self, err: &HarnessError) -> Result<(), String> {
        if !(err.is_session_expired() && self.options.relogin_on_expiry) {
            return Err(err.to_string());
        }
        self.session
            .relogin()
            .await
            .map_err(|relogin| format!("{err}; re-login failed: {relogin}"))
    }

    fn record(&self, report: &mut RunReport, result: TestResult) {
        let outcome = match result.outcome {
            TestOutcome::Passed => TestEventOutcome::Passed,
            TestOutcome::Failed => TestEventOutcome::Failed,
            TestOutcome::Errored => TestEventOutcome::Errored,
        };
        let log_ctx = rig_logging::LogContext::new()
            .with_script(&report.script)
            .with_test(&result.name)
            .with_user(self.session.username());
        let message = match &result.failure {
            Some(failure) => failure.to_string(),
            None => format!("{} passed", result.name),
        };
        log_test_event(Some(&log_ctx), "test.finished", &message, outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_test(&report.script, result.outcome);
        }
        report.push(result);
    }
}
