//! ---
//! rig_section: "03-logging"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Structured logging adapters and sinks."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Logging context shared by the harness runner and the suites.

use tracing::Level;

pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Script (suite) currently executing.
    pub script: Option<&'a str>,
    /// Test function currently executing.
    pub test: Option<&'a str>,
    /// Authenticated user driving the session.
    pub user: Option<&'a str>,
    /// Entity the event refers to, rendered as `kind:id`.
    pub entity: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a script name.
    pub fn with_script(mut self, script: &'a str) -> Self {
        self.script = Some(script);
        self
    }

    /// Attach a test name.
    pub fn with_test(mut self, test: &'a str) -> Self {
        self.test = Some(test);
        self
    }

    /// Attach the session user.
    pub fn with_user(mut self, user: &'a str) -> Self {
        self.user = Some(user);
        self
    }

    /// Attach an entity reference.
    pub fn with_entity(mut self, entity: &'a str) -> Self {
        self.entity = Some(entity);
        self
    }
}

/// Outcome used when emitting per-test lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestEventOutcome {
    /// The test passed.
    Passed,
    /// An assertion inside the test failed.
    Failed,
    /// The test raised an unexpected error, timed out or panicked.
    Errored,
}

impl TestEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            TestEventOutcome::Passed => "passed",
            TestEventOutcome::Failed => "failed",
            TestEventOutcome::Errored => "errored",
        }
    }

    fn level(&self) -> Level {
        match self {
            TestEventOutcome::Passed => Level::INFO,
            TestEventOutcome::Failed => Level::WARN,
            TestEventOutcome::Errored => Level::ERROR,
        }
    }
}

/// Emit the standard per-test lifecycle event.
pub fn log_test_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: TestEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let script = ctx.script.unwrap_or("");
    let test = ctx.test.unwrap_or("");
    let user = ctx.user.unwrap_or("");
    let outcome_label = outcome.as_str();
    // `tracing::event!` needs a constant level, so dispatch per level.
    match outcome.level() {
        Level::INFO => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome_label,
            script,
            test,
            user,
            message = %message
        ),
        Level::WARN => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome_label,
            script,
            test,
            user,
            message = %message
        ),
        _ => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome_label,
            script,
            test,
            user,
            message = %message
        ),
    }
}
