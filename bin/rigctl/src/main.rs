//! ---
//! rig_section: "05-networking-external-interfaces"
//! rig_subsection: "binary"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Control CLI listing and running integration scripts."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rig_client::{Credentials, HttpTransport, RemoteServer, Session};
use rig_common::{init_tracing, HarnessConfig};
use rig_sim::{RpcServer, SimulatedServer};
use rig_testharness::{new_registry, HarnessMetrics, RunReport, RunnerOptions, TestRunner, TestScript};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/rig.toml";
const SIM_ACCOUNT: &str = "rigadmin";

#[derive(Debug, Parser)]
#[command(author, version, about = "Remote integration rig control utility", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "List bundled scripts and their tests")]
    List,
    #[command(about = "Run scripts against the configured server")]
    Run(RunArgs),
    #[command(about = "Serve the simulated server over HTTP until interrupted")]
    ServeSim {
        #[arg(long, default_value = "127.0.0.1:7080")]
        listen: SocketAddr,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    #[arg(long = "suite", value_name = "NAME", help = "Script to run; repeat for several, default all")]
    suites: Vec<String>,
    #[arg(long = "test", value_name = "NAME", help = "Run only these tests of a single script")]
    tests: Vec<String>,
    #[arg(long, help = "Run against an in-process simulated server")]
    simulate: bool,
    #[arg(long, value_name = "FILE", help = "Write the JSON run report here")]
    report: Option<PathBuf>,
    #[arg(long, value_name = "FILE", help = "Write prometheus metrics text here")]
    metrics: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::List => {
            list_scripts();
            Ok(())
        }
        Commands::Run(args) => {
            let config = init(cli.config.as_deref(), args.simulate)?;
            run(config, args).await
        }
        Commands::ServeSim { listen } => {
            init(cli.config.as_deref(), true)?;
            serve_sim(listen).await
        }
    }
}

fn list_scripts() {
    for script in rig_suites::all() {
        println!("{}: {}", script.name(), script.description().unwrap_or(""));
        for name in script.test_names() {
            println!("  {name}");
        }
    }
}

/// Load the configuration file, falling back to defaults for simulated runs.
fn load_config(explicit: Option<&Path>, simulate: bool) -> Result<(HarnessConfig, Option<PathBuf>)> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));
    match HarnessConfig::load_with_source(&candidates) {
        Ok(loaded) => Ok((loaded.config, Some(loaded.source))),
        Err(_) if simulate && explicit.is_none() => Ok((HarnessConfig::default(), None)),
        Err(err) => Err(err),
    }
}

fn init(explicit: Option<&Path>, simulate: bool) -> Result<HarnessConfig> {
    let (config, source) = load_config(explicit, simulate)?;
    let run_log = init_tracing("rigctl", &config.logging)?;
    match source {
        Some(path) => info!(
            config_path = %path.display(),
            run_id = %run_log.run_id,
            "configuration loaded"
        ),
        None => warn!("no configuration file found, using defaults"),
    }
    Ok(config)
}

fn select_scripts(names: &[String]) -> Result<Vec<TestScript>> {
    if names.is_empty() {
        return Ok(rig_suites::all());
    }
    names
        .iter()
        .map(|name| {
            rig_suites::by_name(name).ok_or_else(|| {
                let known: Vec<_> = rig_suites::all()
                    .iter()
                    .map(|script| script.name().to_owned())
                    .collect();
                anyhow!("unknown suite '{name}', expected one of: {}", known.join(", "))
            })
        })
        .collect()
}

async fn connect(config: &HarnessConfig, simulate: bool) -> Result<Session> {
    let username = config.credentials.username.clone();
    let session = if simulate {
        let password = config
            .credentials
            .resolve_password()
            .unwrap_or_else(|_| SIM_ACCOUNT.to_owned());
        let server: Arc<dyn RemoteServer> = Arc::new(SimulatedServer::default());
        Session::login(server, Credentials::new(username, password)).await
    } else {
        let transport =
            HttpTransport::new(config.server.endpoint_url()?, config.server.request_timeout)
                .context("failed to build http transport")?;
        let server: Arc<dyn RemoteServer> = Arc::new(transport);
        let password = config.credentials.resolve_password()?;
        Session::login(server, Credentials::new(username, password)).await
    };
    session.context("login failed")
}

async fn run(config: HarnessConfig, args: RunArgs) -> Result<()> {
    let scripts = select_scripts(&args.suites)?;
    if !args.tests.is_empty() && scripts.len() != 1 {
        bail!("--test requires exactly one --suite");
    }

    let session = connect(&config, args.simulate).await?;
    let metrics = HarnessMetrics::new(new_registry())?;
    let runner = TestRunner::new(session.clone(), RunnerOptions::from_config(&config))
        .with_metrics(metrics.clone());

    let mut reports: Vec<RunReport> = Vec::with_capacity(scripts.len());
    for script in &scripts {
        let report = if args.tests.is_empty() {
            runner.execute_all(script).await?
        } else {
            runner.execute_subset(script, args.tests.as_slice()).await?
        };
        println!("{report}\n");
        let aborted = report.aborted.is_some();
        reports.push(report);
        if aborted {
            warn!(script = script.name(), "run aborted, skipping remaining scripts");
            break;
        }
    }
    if let Err(err) = session.logout().await {
        warn!(error = %err, "logout failed");
    }

    if let Some(path) = args.report.as_ref().or(config.runner.report_path.as_ref()) {
        let json = serde_json::to_string_pretty(&reports)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("unable to write report {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }
    if let Some(path) = &args.metrics {
        tokio::fs::write(path, metrics.encode_text()?)
            .await
            .with_context(|| format!("unable to write metrics {}", path.display()))?;
    }

    let failed: Vec<_> = reports
        .iter()
        .filter(|report| !report.is_success())
        .map(|report| report.script.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("scripts did not pass: {}", failed.join(", ")))
    }
}

async fn serve_sim(listen: SocketAddr) -> Result<()> {
    let backend: Arc<dyn RemoteServer> = Arc::new(SimulatedServer::default());
    let handle = RpcServer::new(listen, backend).spawn().await?;
    info!(endpoint = %handle.endpoint(), "simulated server listening");
    signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.shutdown().await
}
