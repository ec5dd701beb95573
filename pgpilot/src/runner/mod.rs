//! Playbook execution for pgpilot
//!
//! Handles a single blocking round-trip with the external runner:
//! - spawn `<program> -i <inventory> <playbook>`
//! - capture stdout and stderr separately
//! - report failure as "no output" instead of an error
//!
//! No retry, no timeout, no streaming.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info};

use crate::config::RunnerConfig;

/// Playbook execution result
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured stdout on exit code zero, `None` otherwise
    pub output: Option<String>,
    /// Captured stderr (or spawn error) when the run failed
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u128,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            exit_code: Some(0),
            execution_time_ms: 0,
        }
    }

    pub fn failed(exit_code: Option<i32>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            exit_code,
            execution_time_ms: 0,
        }
    }

    fn timed(mut self, start: Instant) -> Self {
        self.execution_time_ms = start.elapsed().as_millis();
        self
    }
}

/// Anything able to run a playbook against an inventory file.
///
/// Implementations never return an error for a failed run: a failure is an
/// `ExecutionResult` whose `output` is `None`.
#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    async fn run_playbook(&self, inventory: &Path, playbook: &str) -> ExecutionResult;
}

/// Runs `ansible-playbook` (or a configured substitute) as a child process
#[derive(Debug, Clone)]
pub struct AnsibleRunner {
    program: String,
    extra_args: Vec<String>,
}

impl AnsibleRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    async fn execute(&self, inventory: &Path, playbook: &str) -> std::io::Result<std::process::Output> {
        AsyncCommand::new(&self.program)
            .args(&self.extra_args)
            .arg("-i")
            .arg(inventory)
            .arg(playbook)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
    }
}

#[async_trait]
impl PlaybookRunner for AnsibleRunner {
    async fn run_playbook(&self, inventory: &Path, playbook: &str) -> ExecutionResult {
        let start_time = Instant::now();
        info!("Running playbook: {} with inventory: {}", playbook, inventory.display());
        debug!("Runner program: {} {:?}", self.program, self.extra_args);

        let output = match self.execute(inventory, playbook).await {
            Ok(output) => output,
            Err(e) => {
                error!("Playbook {} could not be started ({}): {}", playbook, self.program, e);
                return ExecutionResult::failed(None, format!("failed to spawn {}: {}", self.program, e))
                    .timed(start_time);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if output.status.success() {
            info!("Playbook {} executed successfully.", playbook);
            ExecutionResult::succeeded(stdout).timed(start_time)
        } else {
            error!("Playbook {} failed with error: {}", playbook, stderr.trim_end());
            ExecutionResult::failed(exit_code, stderr).timed(start_time)
        }
    }
}
