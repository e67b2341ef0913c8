//! ---
//! rig_section: "11-test-harness"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Error taxonomy for test bodies and the runner."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::time::Duration;

use rig_client::{ClientError, OperationTarget};
use thiserror::Error;

use crate::assert::AssertionFailure;

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Everything a test body or the runner can fail with.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HarnessError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    /// The remote operation was still in progress when the wait expired.
    /// The server-side operation is not cancelled.
    #[error("{target} still in progress after {}ms ({polls} polls)", .waited.as_millis())]
    PollingTimeout {
        target: OperationTarget,
        waited: Duration,
        polls: u32,
    },
    #[error("script '{script}' has no test named '{name}'")]
    UnknownTest { script: String, name: String },
    #[error("fixture '{0}' was not registered by setup")]
    MissingFixture(String),
}

impl HarnessError {
    /// Authentication and session failures end the whole run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, HarnessError::Client(err) if err.is_fatal_to_run())
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, HarnessError::Client(ClientError::SessionExpired))
    }
}
