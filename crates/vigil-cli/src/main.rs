//! Vigil - verification & remediation CLI
//!
//! The `vigil` command runs a project's verification stages on behalf of an
//! automated coding session.
//!
//! ## Commands
//!
//! - `remediate`: verify, auto-fix for a bounded number of rounds, write a report
//! - `gate`: decide whether a "work is complete" signal may proceed
//!
//! The invocation payload is JSON, read from `--payload` or stdin. The result is
//! printed as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::Level;

use vigil_core::{
    init_tracing, Engine, EngineConfig, GateOutput, InvocationPayload, NtfyConfig,
    RemediationReport,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verification & remediation engine for coding sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine config file (TOML)
    #[arg(long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for audit logs, reports and the invocation lock
    #[arg(long, global = true, env = "VIGIL_AUDIT_DIR")]
    audit_dir: Option<PathBuf>,

    /// Maximum remediation rounds
    #[arg(long, global = true)]
    max_fix_attempts: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the project, auto-fix what can be fixed and write a report
    Remediate {
        /// Invocation payload (JSON); stdin when omitted
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },

    /// Evaluate a completion signal against one verification pass
    Gate {
        /// Invocation payload (JSON); stdin when omitted
        #[arg(short, long)]
        payload: Option<PathBuf>,
    },
}

/// What `vigil remediate` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemediateOutput {
    #[serde(flatten)]
    report: RemediationReport,
    report_path: PathBuf,
    digest: String,
}

/// Printed when remediation could not run at all.
#[derive(Debug, Serialize)]
struct ErrorOutput {
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match &cli.command {
        Commands::Remediate { payload } => {
            let payload = read_payload(payload.as_deref())?;
            let engine = Engine::new(load_config(&cli, &payload)?).context("Failed to build engine")?;
            cmd_remediate(&engine, &payload).await
        }
        Commands::Gate { payload } => {
            let payload = read_payload(payload.as_deref())?;
            let engine = Engine::new(load_config(&cli, &payload)?).context("Failed to build engine")?;
            cmd_gate(&engine, &payload).await
        }
    }
}

async fn cmd_remediate(engine: &Engine, payload: &InvocationPayload) -> Result<()> {
    match engine.remediate(payload).await {
        Ok(outcome) => {
            let output = RemediateOutput {
                report: outcome.report,
                report_path: outcome.stored.path,
                digest: outcome.stored.digest,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Err(e) => {
            tracing::error!(error = %e, "remediation did not run");
            let output = ErrorOutput { error: e.to_string() };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn cmd_gate(engine: &Engine, payload: &InvocationPayload) -> Result<()> {
    let decision = engine.gate(payload).await;
    let output = GateOutput::from(&decision);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_payload(path: Option<&Path>) -> Result<InvocationPayload> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload: {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read payload from stdin")?;
            raw
        }
    };
    if raw.trim().is_empty() {
        return Ok(InvocationPayload::default());
    }
    InvocationPayload::from_json(&raw).context("Invalid invocation payload")
}

/// Config file (or defaults rooted at the payload's project), then flags.
fn load_config(cli: &Cli, payload: &InvocationPayload) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::for_project(
            payload
                .project_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        ),
    };

    if let Some(dir) = &cli.audit_dir {
        config = config.with_audit_dir(dir);
    }
    if let Some(n) = cli.max_fix_attempts {
        config = config.with_max_fix_attempts(n);
    }
    if config.ntfy.is_none() {
        config.ntfy = NtfyConfig::from_env();
    }

    config.validate().context("Invalid engine config")?;
    Ok(config)
}
