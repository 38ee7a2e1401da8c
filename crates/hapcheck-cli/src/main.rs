//! hapcheck - HAP bridge smoke checks
//!
//! Verifies a HomeKit Accessory Protocol bridge is reachable and
//! discoverable, and exits with a status usable by `git bisect run`.
//!
//! ## Commands
//!
//! - `pairing` (default): TCP, pairing challenge, web API and mDNS probes
//! - `mdns`: port check followed by the mDNS advertisement probe
//!
//! ## Exit codes
//!
//! - `0`: pass, or pass with warnings (critical probes passed)
//! - `1`: fail, or an unexpected error
//! - `130`: interrupted

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dnssd_browser::BrowserKind;
use hapcheck_core::config::DEFAULT_INSTANCE_PATTERN;
use hapcheck_core::{init_tracing, Check, CheckConfig, CheckReport, DiscoveryConfig, ExitStatus};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "hapcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check that a HAP bridge is reachable and discoverable", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Print the full run report as JSON on stdout
    #[arg(long, global = true)]
    report: bool,

    /// Host running the bridge [env: HAPCHECK_HOST] [default: localhost]
    #[arg(long, global = true)]
    host: Option<String>,

    /// HAP accessory server port [env: HAPCHECK_HAP_PORT] [default: 51826]
    #[arg(long, global = true)]
    hap_port: Option<u16>,

    /// Companion web API port [env: HAPCHECK_WEB_PORT] [default: 3000]
    #[arg(long, global = true)]
    web_port: Option<u16>,

    /// Per-probe timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    timeout_secs: u64,

    /// Seconds to wait for the server to stabilize before probing
    #[arg(long, global = true, default_value = "2")]
    settle_secs: u64,

    /// How long to browse for advertisements, in milliseconds
    #[arg(long, global = true, default_value = "3000")]
    browse_window_ms: u64,

    /// How long each instance resolution may take, in milliseconds
    #[arg(long, global = true, default_value = "2000")]
    resolve_window_ms: u64,

    /// Regular expression the advertised instance name must match
    #[arg(long, global = true, default_value = DEFAULT_INSTANCE_PATTERN)]
    instance_pattern: String,

    /// Discovery browser to use (dns-sd or avahi); picked from the host OS if omitted
    #[arg(long, global = true)]
    browser: Option<BrowserKind>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run the full pairing suite (default)
    Pairing,

    /// Only check that the bridge is listening and advertised via mDNS
    Mdns,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let status = tokio::select! {
        result = execute(&cli) => match result {
            Ok(report) => report.exit_status(),
            Err(e) => {
                error!(error = %format!("{:#}", e), "unexpected error");
                ExitStatus::Failure
            }
        },
        _ = interrupted() => {
            warn!("tests interrupted by user");
            ExitStatus::Interrupted
        }
    };

    ExitCode::from(status.code() as u8)
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

/// Merge environment defaults with command-line overrides.
fn build_config(cli: &Cli) -> CheckConfig {
    let mut config = CheckConfig::from_env()
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_settle(Duration::from_secs(cli.settle_secs));

    if let Some(host) = &cli.host {
        config.target.host = host.clone();
    }
    if let Some(port) = cli.hap_port {
        config.target.hap_port = port;
    }
    if let Some(port) = cli.web_port {
        config.target.web_port = port;
    }

    let discovery = DiscoveryConfig {
        instance_pattern: cli.instance_pattern.clone(),
        browse_window: Duration::from_millis(cli.browse_window_ms),
        resolve_window: Duration::from_millis(cli.resolve_window_ms),
        browser: cli.browser,
        ..config.discovery.clone()
    };
    config.with_discovery(discovery)
}

async fn execute(cli: &Cli) -> Result<CheckReport> {
    let config = build_config(cli);
    info!(
        browser = %config.discovery.browser_kind(),
        timeout_secs = config.timeout.as_secs(),
        "resolved configuration"
    );

    let check = match cli.command.unwrap_or(Commands::Pairing) {
        Commands::Pairing => Check::pairing(config),
        Commands::Mdns => Check::discoverability(config),
    }
    .context("Failed to set up checks")?;

    // A panic outside any probe surfaces as a JoinError instead of aborting.
    let report = tokio::spawn(async move { check.run().await })
        .await
        .context("Check run aborted")?;

    if cli.report {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    }

    Ok(report)
}
