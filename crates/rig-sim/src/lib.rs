//! ---
//! rig_section: "11-simulation"
//! rig_subsection: "01-bootstrap"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Simulated server module exports."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
//! In-memory resource-management server.
//!
//! [`SimulatedServer`] implements the client's `RemoteServer` contract
//! directly, so tests can hand it to a session without any transport.
//! [`RpcServer`] puts any `RemoteServer` behind the HTTP routes spoken by
//! `HttpTransport`.

pub mod inventory;
pub mod rpc;
mod server;
mod state;

pub use inventory::InventorySeed;
pub use rpc::{RpcServer, RpcServerHandle};
pub use server::{SimOptions, SimulatedServer};
pub use state::Fault;
