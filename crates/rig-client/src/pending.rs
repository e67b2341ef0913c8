//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Handles for asynchronous mutations and the completion probe seam."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::remote::{OperationStatus, OperationTarget};

/// Handle for a mutation that completes on the server after the call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub target: OperationTarget,
    pub submitted_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(target: OperationTarget, submitted_at: DateTime<Utc>) -> Self {
        Self {
            target,
            submitted_at,
        }
    }
}

/// Terminal state of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Succeeded,
    Failed { message: String },
}

impl TerminalState {
    /// `None` while the operation is still running.
    pub fn from_status(status: OperationStatus) -> Option<Self> {
        match status {
            OperationStatus::InProgress => None,
            OperationStatus::Succeeded => Some(TerminalState::Succeeded),
            OperationStatus::Failed { message } => Some(TerminalState::Failed { message }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Succeeded)
    }
}

/// Result of a mutation: either already in effect or still running.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    Applied(T),
    Pending(PendingOperation),
}

impl<T> Mutation<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Mutation::Pending(_))
    }

    pub fn pending(&self) -> Option<&PendingOperation> {
        match self {
            Mutation::Pending(pending) => Some(pending),
            Mutation::Applied(_) => None,
        }
    }

    pub fn into_applied(self) -> Option<T> {
        match self {
            Mutation::Applied(value) => Some(value),
            Mutation::Pending(_) => None,
        }
    }
}

/// Implemented by proxies whose mutations can complete asynchronously.
///
/// The poller only needs a status check and, once the operation reaches a
/// terminal state, a way to read the resulting value back.
#[async_trait]
pub trait CompletionProbe: Send + Sync {
    type Settled: Send;

    async fn status(&self, target: OperationTarget) -> ClientResult<OperationStatus>;

    async fn is_in_progress(&self, target: OperationTarget) -> ClientResult<bool> {
        Ok(matches!(
            self.status(target).await?,
            OperationStatus::InProgress
        ))
    }

    /// Read the post-completion state of the target.
    async fn settle(&self, target: OperationTarget) -> ClientResult<Self::Settled>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityId;
    use crate::remote::OperationDomain;

    #[test]
    fn terminal_state_only_for_finished_operations() {
        assert_eq!(TerminalState::from_status(OperationStatus::InProgress), None);
        assert_eq!(
            TerminalState::from_status(OperationStatus::Failed {
                message: "agent down".into()
            }),
            Some(TerminalState::Failed {
                message: "agent down".into()
            })
        );
    }

    #[test]
    fn mutation_accessors() {
        let target = OperationTarget::new(OperationDomain::BundleDeployment, EntityId(5));
        let pending: Mutation<()> = Mutation::Pending(PendingOperation::new(target, Utc::now()));
        assert!(pending.is_pending());
        assert_eq!(pending.pending().map(|p| p.target), Some(target));
        assert_eq!(Mutation::Applied(3).into_applied(), Some(3));
    }
}
