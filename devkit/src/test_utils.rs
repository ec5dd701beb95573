/*!
Test harness for pgpilot workflows

Wires a workflow to a scratch directory and a scripted runner:
- inventories are written under a temporary directory
- runner results are scripted per playbook
- log lines can be captured for assertions
*/

use crate::inventory_helpers::{read_flat_inventory, read_grouped_inventory, GroupedSection};
use crate::runner_stub::ScriptedRunner;
use anyhow::{Context, Result};
use pgpilot::{FailurePolicy, HostDescriptor, PilotConfig, Workflow, WorkflowReport};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Complete harness for workflow tests
pub struct TestHarness {
    pub runner: ScriptedRunner,
    config: PilotConfig,
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("failed to create scratch dir")?;
        let config = PilotConfig::default().with_inventory_dir(dir.path());
        Ok(Self {
            runner: ScriptedRunner::new(),
            config,
            dir,
        })
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.config = self.config.with_failure_policy(policy);
        self
    }

    /// Adjust the config before running; inventory paths stay in the scratch dir
    pub fn with_config(mut self, edit: impl FnOnce(&mut PilotConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Run a quiet workflow against the scripted runner
    pub async fn run(&self, first: &str, second: &str) -> Result<WorkflowReport> {
        let workflow = Workflow::new(self.config.clone(), self.runner.clone()).quiet();
        let report = workflow.run(first, second).await?;
        tracing::info!("[harness] workflow finished: {:?}", report.status);
        Ok(report)
    }

    pub fn read_load_check_inventory(&self) -> Result<Vec<HostDescriptor>> {
        read_flat_inventory(&std::fs::read_to_string(&self.config.inventories.load_check)?)
    }

    pub fn read_chosen_inventory(&self) -> Result<Vec<HostDescriptor>> {
        read_flat_inventory(&std::fs::read_to_string(&self.config.inventories.chosen)?)
    }

    pub fn read_config_inventory(&self) -> Result<Vec<GroupedSection>> {
        read_grouped_inventory(&std::fs::read_to_string(&self.config.inventories.config)?)
    }

    /// Assert the playbooks ran exactly in this order
    pub fn assert_played(&self, expected: &[&str]) -> Result<()> {
        let played = self.runner.played();
        if played != expected {
            anyhow::bail!("expected playbooks {:?}, got {:?}", expected, played);
        }
        Ok(())
    }
}

/// Collects formatted log output of the current thread
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's tracing output into the capture until the guard drops.
    /// Only reliable with current-thread runtimes.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).lines().map(str::to_string).collect()
    }

    /// Lines logged at `level` ("ERROR", "WARN", "INFO", ...)
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        let marker = format!(" {} ", level);
        self.lines().into_iter().filter(|l| l.contains(&marker)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner_stub::AnsibleOutputBuilder;

    #[tokio::test]
    async fn test_harness_basic_run() {
        let harness = TestHarness::new().unwrap();
        harness.runner.succeed_with(
            "load_check.yml",
            AnsibleOutputBuilder::new("Check load")
                .host_loads("Debian", &[2.0, 2.0])
                .host_loads("Almalinux", &[1.0, 1.0])
                .build(),
        );

        let report = harness.run("a", "b").await.unwrap();
        assert!(report.is_done());
        assert_eq!(report.selection.unwrap().chosen.name, "Almalinux");
        harness
            .assert_played(&["load_check.yml", "install_postgres.yml", "config_postgres.yml", "check_postgres.yml"])
            .unwrap();
    }

    #[test]
    fn test_log_capture_filters_levels() {
        let capture = LogCapture::new();
        {
            let _guard = capture.install();
            tracing::info!("hello");
            tracing::error!("broken");
        }
        assert_eq!(capture.lines_at("ERROR").len(), 1);
        assert!(capture.lines_at("INFO")[0].contains("hello"));
    }
}
