//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Session, criteria and manager proxy client."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
//! Client for a remote resource-management server.
//!
//! A [`Session`] authenticates once and hands out per-domain manager
//! proxies. Queries are expressed with [`QueryCriteria`]; mutations that
//! complete in the background return [`Mutation::Pending`] and are settled
//! through the [`CompletionProbe`] each asynchronous proxy implements.

pub mod criteria;
pub mod error;
pub mod http;
pub mod model;
pub mod pending;
pub mod proxy;
pub mod remote;
pub mod session;

pub use criteria::{CriteriaQuery, FilterKey, FilterValue, PageControl, QueryCriteria, SortOrder};
pub use error::{ClientError, ClientResult, RemoteError, RemoteResult};
pub use http::HttpTransport;
pub use model::{Configuration, Entity, EntityId, EntityKind, FileReference, PropertySimple};
pub use pending::{CompletionProbe, Mutation, PendingOperation, TerminalState};
pub use proxy::{
    BundleProxy, ConfigurationProxy, DeleteOutcome, DeletePolicy, EventProxy, ManagerProxy,
    MutationMode, MutationSpec, OperationProxy, ProxyCapabilities, ResourceGroupProxy,
    ResourceProxy, ResourceTypeProxy,
};
pub use remote::{
    AuthToken, ConfigurationScope, ContentUpload, EntityDraft, OperationDomain,
    OperationSchedule, OperationStatus, OperationTarget, RemoteServer, UpdateReceipt,
    UpdateRequest,
};
pub use session::{Credentials, RunLease, Session};
