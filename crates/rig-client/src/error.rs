//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Error taxonomy for remote calls and the client facade."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{EntityId, EntityKind};

/// Result alias for collaborator calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Result alias for proxy and session calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors reported by the remote server. Serialisable so the HTTP transport
/// can carry them in error bodies.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum RemoteError {
    /// Credentials were rejected.
    #[error("authentication rejected: {0}")]
    Unauthenticated(String),
    /// The presented token is unknown or has been invalidated.
    #[error("session token is not valid")]
    InvalidToken,
    /// The request payload was malformed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The addressed entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },
    /// The server could not be reached.
    #[error("server unavailable: {0}")]
    Unavailable(String),
    /// Any other server-side fault.
    #[error("server error: {0}")]
    Internal(String),
}

/// Errors surfaced to harness code by sessions and manager proxies.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// Bad credentials or unreachable server during login.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The session was logged out or the server no longer accepts its token.
    #[error("session expired or logged out")]
    SessionExpired,
    /// The session is already bound to an active run.
    #[error("session is already bound to another run")]
    SessionInUse,
    /// A criteria filter key or value is not valid for the entity kind.
    #[error("invalid filter '{key}' for {kind}: {reason}")]
    InvalidFilter {
        kind: EntityKind,
        key: String,
        reason: String,
    },
    /// Malformed input rejected by the client or the server.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The addressed entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },
    /// The transport failed after a session was established.
    #[error("transport error: {0}")]
    Transport(String),
    /// Server-side fault.
    #[error("server error: {0}")]
    Server(String),
}

impl ClientError {
    /// Only authentication and session failures end a whole run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            ClientError::Authentication(_) | ClientError::SessionExpired
        )
    }

    pub(crate) fn invalid_filter(
        kind: EntityKind,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ClientError::InvalidFilter {
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthenticated(reason) => ClientError::Authentication(reason),
            RemoteError::InvalidToken => ClientError::SessionExpired,
            RemoteError::Validation(reason) => ClientError::Validation(reason),
            RemoteError::Conflict(reason) => ClientError::Conflict(reason),
            RemoteError::NotFound { kind, id } => ClientError::NotFound { kind, id },
            RemoteError::Unavailable(reason) => ClientError::Transport(reason),
            RemoteError::Internal(reason) => ClientError::Server(reason),
        }
    }
}
