//! ---
//! rig_section: "01-core-functionality"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Per-run tracing setup for harness binaries."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RIG_LOG";
const FALLBACK_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console output format. The run log file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    StructuredJson,
}

/// The log file written for one harness invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    pub run_id: String,
    pub path: PathBuf,
}

impl RunLog {
    pub fn new(service: &str, config: &LoggingConfig, started: DateTime<Utc>) -> Self {
        let run_id = started.format("%Y%m%dT%H%M%S%3fZ").to_string();
        let prefix = config.file_prefix.as_deref().unwrap_or("rig");
        let path = config
            .directory
            .join(format!("{prefix}-{service}-{run_id}.log"));
        Self { run_id, path }
    }
}

/// Pick the filter directive: `RIG_LOG`, then `RUST_LOG`, then the
/// configured `logging.level`, then `info`.
pub fn filter_directive(
    rig_log: Option<String>,
    rust_log: Option<String>,
    configured: Option<&str>,
) -> String {
    rig_log
        .or(rust_log)
        .filter(|directive| !directive.trim().is_empty())
        .or_else(|| configured.map(str::to_owned))
        .unwrap_or_else(|| FALLBACK_DIRECTIVE.to_owned())
}

fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("invalid log filter '{directive}' ({err}); using {FALLBACK_DIRECTIVE}");
        EnvFilter::new(FALLBACK_DIRECTIVE)
    })
}

/// Install the global subscriber for one run of `service`.
///
/// Every invocation gets its own JSON log file named after the service and
/// the start time, so a report can point at the log of the run that made it.
/// Console output follows `config.format`. Installing twice is a no-op for
/// the subscriber but still returns the file the caller would have used.
pub fn init_tracing(service: &str, config: &LoggingConfig) -> Result<RunLog> {
    let run_log = RunLog::new(service, config, Utc::now());
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;
    let file_name = run_log
        .path
        .file_name()
        .map(|name| name.to_os_string())
        .context("run log path has no file name")?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(rolling::never(&config.directory, file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set((file_guard, stdout_guard));

    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        config.level.as_deref(),
    );

    let console = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
    };
    let run_file = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_current_span(true)
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(build_filter(&directive))
        .with(console)
        .with(run_file)
        .try_init()
        .ok();

    info!(
        service,
        run_id = %run_log.run_id,
        log_file = %run_log.path.display(),
        filter = %directive,
        "run logging started"
    );
    Ok(run_log)
}
