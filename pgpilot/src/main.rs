//! pgpilot - PostgreSQL placement on the less loaded of two hosts
//!
//! Usage: `pgpilot "debian-host[:port],almalinux-host[:port]"`
//!
//! Progress goes to stdout, timestamped logs to stderr (`RUST_LOG` to tune).

use anyhow::{Context, Result};
use clap::Parser;
use pgpilot::{AnsibleRunner, FailurePolicy, PilotConfig, Workflow, WorkflowReport, WorkflowStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "pgpilot",
    about = "Install PostgreSQL on the less loaded of two hosts",
    version
)]
struct Cli {
    /// Comma-separated addresses of the two candidates: "host1[:port1],host2[:port2]"
    #[arg(value_parser = parse_address_pair)]
    addresses: AddressPair,

    /// Config file (YAML). Missing file means built-in defaults.
    #[arg(short, long, env = "PGPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Keep going when install, configure or verify fails
    #[arg(long)]
    best_effort: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AddressPair {
    first: String,
    second: String,
}

fn parse_address_pair(raw: &str) -> Result<AddressPair, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    match parts.as_slice() {
        [first, second] if !first.is_empty() && !second.is_empty() => Ok(AddressPair {
            first: first.to_string(),
            second: second.to_string(),
        }),
        _ => Err(format!(
            "expected exactly two comma-separated addresses, got '{}'",
            raw
        )),
    }
}

fn print_report(report: &WorkflowReport) {
    match &report.status {
        WorkflowStatus::Done => {
            if let Some(output) = report.verify_output() {
                println!("PostgreSQL installation check output:");
                println!("{}", output);
            }
            let failed = report.failed_stages();
            if !failed.is_empty() {
                let names: Vec<String> = failed.iter().map(|s| s.to_string()).collect();
                println!("Warning: failed stages: {}. Check logs for details.", names.join(", "));
            }
            println!("PostgreSQL setup completed successfully.");
        }
        WorkflowStatus::Aborted { stage } => {
            println!("Error: {} playbook failed. Check logs for details.", stage);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pgpilot=info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = PilotConfig::resolve_path(cli.config.as_deref());
    let mut config = PilotConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if cli.best_effort {
        config = config.with_failure_policy(FailurePolicy::BestEffort);
    }

    info!("pgpilot starting (failure policy: {:?})", config.failure_policy);

    let runner = AnsibleRunner::from_config(&config.runner);
    let mut workflow = Workflow::new(config, runner);
    if cli.json {
        workflow = workflow.quiet();
    }

    let report = workflow
        .run(&cli.addresses.first, &cli.addresses.second)
        .await
        .context("Workflow execution failed")?;

    if cli.json {
        let payload = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", payload);
    } else {
        print_report(&report);
    }

    Ok(if report.is_done() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
