//! ---
//! rig_section: "01-core-functionality"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Shared primitives and utilities for the rig runtime."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
//! Core shared primitives for the remote integration rig.
//! This crate exposes configuration loading and tracing setup consumed
//! by the harness binary and the suites.

pub mod config;
pub mod logging;

pub use config::{
    CredentialsConfig, HarnessConfig, LoadedHarnessConfig, LoggingConfig, PollingConfig,
    RunnerConfig, ServerConfig,
};
pub use logging::{filter_directive, init_tracing, LogFormat, RunLog};
