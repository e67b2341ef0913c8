//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "01-bootstrap"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Test harness exports: poller, assertions, scripts and runner."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
//! Drives scripted integration tests against a remote server.
//!
//! A [`TestScript`] is an ordered set of async test functions. The
//! [`TestRunner`] executes them one at a time over a single session,
//! isolating failures per test and collecting a [`RunReport`]. Tests wait
//! for asynchronous mutations with the [`CompletionPoller`] and check
//! results with the `assert_*` helpers.

pub mod assert;
pub mod context;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod report;
pub mod runner;
pub mod script;

pub use assert::{
    assert_equals, assert_not_null, assert_number_equals, assert_true, AssertResult,
    AssertionFailure, Number,
};
pub use context::TestContext;
pub use error::{HarnessError, HarnessResult};
pub use metrics::{new_registry, HarnessMetrics, SharedRegistry};
pub use poller::{Completion, CompletionPoller, PollPolicy, MIN_POLL_INTERVAL};
pub use report::{FailureDetail, FailureKind, RunReport, RunSummary, TestOutcome, TestResult};
pub use runner::{RunnerOptions, TestRunner};
pub use script::{TestFn, TestFuture, TestScript};
