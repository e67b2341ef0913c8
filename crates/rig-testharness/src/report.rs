//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Per-test results and run reports."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rig_client::ClientError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use strum::{AsRefStr, Display};

use crate::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    /// An assertion did not hold.
    Failed,
    /// Anything else: remote errors, timeouts, panics, setup failures.
    Errored,
}

/// Coarse classification of why a test did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    /// Server-side slowness or hang rather than a logic defect.
    PollingTimeout,
    Session,
    Validation,
    Domain,
    Server,
    Fixture,
    Setup,
    Panic,
    Harness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actual: None,
            expected: None,
        }
    }

    pub fn from_error(err: &HarnessError) -> Self {
        let kind = match err {
            HarnessError::Assertion(failure) => {
                return Self {
                    kind: FailureKind::Assertion,
                    message: failure.message.clone(),
                    actual: failure.actual.clone(),
                    expected: failure.expected.clone(),
                };
            }
            HarnessError::PollingTimeout { .. } => FailureKind::PollingTimeout,
            HarnessError::MissingFixture(_) => FailureKind::Fixture,
            HarnessError::UnknownTest { .. } => FailureKind::Harness,
            HarnessError::Client(client) => match client {
                ClientError::Authentication(_)
                | ClientError::SessionExpired
                | ClientError::SessionInUse => FailureKind::Session,
                ClientError::InvalidFilter { .. } | ClientError::Validation(_) => {
                    FailureKind::Validation
                }
                ClientError::Conflict(_) | ClientError::NotFound { .. } => FailureKind::Domain,
                ClientError::Transport(_) | ClientError::Server(_) => FailureKind::Server,
            },
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let (Some(actual), Some(expected)) = (&self.actual, &self.expected) {
            write!(f, " (expected {expected}, actual {actual})")?;
        }
        Ok(())
    }
}

/// Outcome of one test function.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub outcome: TestOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    #[serde(rename = "duration_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            outcome: TestOutcome::Passed,
            failure: None,
            duration,
            started_at,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        failure: FailureDetail,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let outcome = if failure.kind == FailureKind::Assertion {
            TestOutcome::Failed
        } else {
            TestOutcome::Errored
        };
        Self {
            name: name.into(),
            outcome,
            failure: Some(failure),
            duration,
            started_at,
        }
    }

    /// Diagnostic message, empty for passing tests.
    pub fn message(&self) -> &str {
        self.failure
            .as_ref()
            .map(|failure| failure.message.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub not_run: usize,
}

impl RunSummary {
    pub fn executed(&self) -> usize {
        self.passed + self.failed + self.errored
    }
}

/// Results of one run of one script, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub script: String,
    pub user: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<TestResult>,
    /// Tests skipped because the run was aborted.
    #[serde(default)]
    pub not_run: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(script: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            user: user.into(),
            started_at: Utc::now(),
            finished_at: None,
            results: Vec::new(),
            not_run: Vec::new(),
            aborted: None,
        }
    }

    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    pub fn abort(&mut self, reason: impl Into<String>, remaining: impl IntoIterator<Item = String>) {
        self.aborted = Some(reason.into());
        self.not_run.extend(remaining);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            not_run: self.not_run.len(),
            ..RunSummary::default()
        };
        for result in &self.results {
            match result.outcome {
                TestOutcome::Passed => summary.passed += 1,
                TestOutcome::Failed => summary.failed += 1,
                TestOutcome::Errored => summary.errored += 1,
            }
        }
        summary
    }

    /// Every test that did not pass, with its diagnostic.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureDetail)> {
        self.results
            .iter()
            .filter_map(|result| result.failure.as_ref().map(|f| (result.name.as_str(), f)))
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|result| result.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.results.iter().all(|r| r.outcome == TestOutcome::Passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "script {} (user {})", self.script, self.user)?;
        for result in &self.results {
            write!(
                f,
                "  {:<8} {} ({}ms)",
                result.outcome.to_string(),
                result.name,
                result.duration.as_millis()
            )?;
            if let Some(failure) = &result.failure {
                write!(f, ": {failure}")?;
            }
            writeln!(f)?;
        }
        for name in &self.not_run {
            writeln!(f, "  {:<8} {name}", "not_run")?;
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "run aborted: {reason}")?;
        }
        let summary = self.summary();
        write!(
            f,
            "{} passed, {} failed, {} errored, {} not run",
            summary.passed, summary.failed, summary.errored, summary.not_run
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert::assert_equals;

    fn sample_report() -> RunReport {
        let now = Utc::now();
        let mut report = RunReport::new("configuration", "rigadmin");
        report.push(TestResult::passed("update_plugin", now, Duration::from_millis(4)));
        let assertion = assert_equals(1u8, 2u8, "property value").unwrap_err();
        report.push(TestResult::failed(
            "update_resource",
            FailureDetail::from_error(&HarnessError::Assertion(assertion)),
            now,
            Duration::from_millis(9),
        ));
        report.push(TestResult::failed(
            "update_group",
            FailureDetail::from_error(&HarnessError::Client(ClientError::Conflict(
                "group exists".into(),
            ))),
            now,
            Duration::from_millis(2),
        ));
        report
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut report = sample_report();
        report.abort("session expired", ["later".to_owned()]);
        let summary = report.summary();
        assert_eq!(
            summary,
            RunSummary {
                passed: 1,
                failed: 1,
                errored: 1,
                not_run: 1
            }
        );
        assert_eq!(summary.executed(), 3);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 2);
    }

    #[test]
    fn assertion_failures_keep_actual_and_expected() {
        let report = sample_report();
        let failed = report.result("update_resource").unwrap();
        assert_eq!(failed.outcome, TestOutcome::Failed);
        let detail = failed.failure.as_ref().unwrap();
        assert_eq!(detail.actual.as_deref(), Some("1"));
        assert_eq!(detail.expected.as_deref(), Some("2"));
        assert_eq!(
            report.result("update_group").unwrap().failure.as_ref().unwrap().kind,
            FailureKind::Domain
        );
    }

    #[test]
    fn json_and_text_rendering() {
        let mut report = sample_report();
        report.finish();
        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.results.len(), 3);
        assert!(json.contains("\"duration_ms\": 9"));

        let text = report.to_string();
        assert!(text.contains("failed   update_resource"));
        assert!(text.ends_with("1 passed, 1 failed, 1 errored, 0 not run"));
    }
}
