//! driftwatch — API contract-compatibility monitor.
//!
//! Probes a reference and a candidate environment side by side and alerts
//! when the candidate persistently breaks the reference contract.
//!
//! # Usage
//!
//! ```text
//! driftwatch init --path driftwatch.toml
//! driftwatch run --config driftwatch.toml
//! driftwatch check --config driftwatch.toml --candidate-url http://staging:8080
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};

use driftwatch_core::{EndpointRegistry, MonitorConfig, MonitorSettings};
use driftwatch_monitor::{HttpProber, Monitor, MonitoringReport};

#[derive(Parser)]
#[command(
    name = "driftwatch",
    about = "Detect API contract drift between a reference and a candidate environment",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text", env = "DRIFTWATCH_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor continuously until Ctrl-C, SIGTERM, or the critical-alert limit.
    Run(MonitorArgs),
    /// Run a single tick, print the report, and fail if anything is incompatible.
    Check(MonitorArgs),
    /// Write a starter driftwatch.toml.
    Init {
        /// Where to write the config.
        #[arg(short, long, default_value = "driftwatch.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct MonitorArgs {
    /// Config file with [monitor] settings and [[endpoints]].
    #[arg(short, long, default_value = "driftwatch.toml", env = "DRIFTWATCH_CONFIG")]
    config: PathBuf,

    /// Base URL of the contract baseline environment.
    #[arg(long, env = "DRIFTWATCH_REFERENCE_URL")]
    reference_url: Option<String>,

    /// Base URL of the environment under validation.
    #[arg(long, env = "DRIFTWATCH_CANDIDATE_URL")]
    candidate_url: Option<String>,

    /// Time between ticks, e.g. "30s".
    #[arg(long, env = "DRIFTWATCH_INTERVAL")]
    interval: Option<String>,

    /// Per-probe timeout, e.g. "10s".
    #[arg(long, env = "DRIFTWATCH_TIMEOUT")]
    timeout: Option<String>,

    /// Consecutive failures before an endpoint alerts.
    #[arg(long, env = "DRIFTWATCH_ALERT_THRESHOLD")]
    alert_threshold: Option<u32>,

    /// Critical alerts after which monitoring stops.
    #[arg(long, env = "DRIFTWATCH_MAX_CRITICAL_ALERTS")]
    max_critical_alerts: Option<u32>,

    /// Maximum probes in flight at once.
    #[arg(long, env = "DRIFTWATCH_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// JSON-lines file that receives every alert.
    #[arg(long, env = "DRIFTWATCH_ALERT_LOG")]
    alert_log: Option<PathBuf>,

    /// File that receives the final report.
    #[arg(long, env = "DRIFTWATCH_REPORT")]
    report: Option<PathBuf>,
}

impl MonitorArgs {
    /// Load the config file, apply command-line overrides, and validate.
    fn load(self) -> anyhow::Result<(MonitorSettings, EndpointRegistry)> {
        let mut config = MonitorConfig::from_file(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        let m = &mut config.monitor;
        if let Some(url) = self.reference_url {
            m.reference_url = Some(url);
        }
        if let Some(url) = self.candidate_url {
            m.candidate_url = Some(url);
        }
        if let Some(interval) = self.interval {
            m.interval = interval;
        }
        if let Some(timeout) = self.timeout {
            m.timeout = timeout;
        }
        if let Some(threshold) = self.alert_threshold {
            m.alert_threshold = threshold;
        }
        if let Some(ceiling) = self.max_critical_alerts {
            m.max_critical_alerts = ceiling;
        }
        if let Some(limit) = self.max_concurrency {
            m.max_concurrency = limit;
        }
        if self.alert_log.is_some() {
            m.alert_log = self.alert_log;
        }
        if self.report.is_some() {
            m.report_path = self.report;
        }

        let settings = config.settings().context("invalid monitor settings")?;
        let registry = config.registry().context("invalid endpoint list")?;
        Ok((settings, registry))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Check(args) => check(args).await,
        Command::Init { path, force } => init(&path, force).map(|()| ExitCode::SUCCESS),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,driftwatch=debug"));

    // Logs go to stderr; stdout carries the JSON report.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: MonitorArgs) -> anyhow::Result<ExitCode> {
    let (settings, registry) = args.load()?;
    let report_path = settings.report_path.clone();

    let monitor = Monitor::new(settings, registry, HttpProber::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, finishing in-flight tick");
        let _ = shutdown_tx.send(true);
    });

    let outcome = monitor.run(shutdown_rx).await;
    emit_report(&outcome.report, report_path.as_deref())?;

    if outcome.reason.is_failure() {
        error!("monitoring stopped itself after reaching the critical-alert limit");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn check(args: MonitorArgs) -> anyhow::Result<ExitCode> {
    let (settings, registry) = args.load()?;
    let report_path = settings.report_path.clone();

    let mut monitor = Monitor::new(settings, registry, HttpProber::new());
    let summary = monitor.run_tick().await;
    emit_report(&monitor.report(), report_path.as_deref())?;

    if summary.failed > 0 {
        warn!(failed = summary.failed, "contract check failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = MonitorConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote starter config");
    Ok(())
}

/// Print the report to stdout and, if configured, write it to a file.
///
/// A failed file write is logged but does not fail the command.
fn emit_report(report: &MonitoringReport, path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if let Some(path) = path {
        match report.write_json(path) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to write report"),
        }
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!(error = %e, "failed to listen for Ctrl-C");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, running until stopped");
        std::future::pending::<()>().await;
    }
}
