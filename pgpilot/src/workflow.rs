//! End-to-end placement workflow
//!
//! `ParseAddresses → WriteFlat(both) → LoadCheck → Compare → WriteFlat(chosen)
//! → Install → WriteGrouped(storage, app) → Configure → Verify → Done`
//!
//! A failed load check always aborts. Install, configure and verify failures
//! abort only under `FailurePolicy::FailFast`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::{FailurePolicy, PilotConfig};
use crate::inventory::{self, InventoryError, InventoryGroup};
use crate::load::{self, Candidate, DebugMsgExtractor, LoadComparison, LoadExtractor};
use crate::models::HostDescriptor;
use crate::runner::{ExecutionResult, PlaybookRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadCheck,
    Install,
    Configure,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadCheck => "load check",
            Stage::Install => "install",
            Stage::Configure => "configure",
            Stage::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// One runner invocation and what came out of it
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub playbook: String,
    pub inventory: PathBuf,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Done,
    Aborted { stage: Stage },
}

/// Database host and application server picked from the load check
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub chosen: HostDescriptor,
    pub other: HostDescriptor,
    pub chosen_load: Vec<f64>,
    pub other_load: Vec<f64>,
    pub comparison: LoadComparison,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failure_policy: FailurePolicy,
    #[serde(flatten)]
    pub status: WorkflowStatus,
    pub selection: Option<Selection>,
    pub stages: Vec<StageOutcome>,
}

impl WorkflowReport {
    pub fn is_done(&self) -> bool {
        self.status == WorkflowStatus::Done
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|s| !s.result.success)
            .map(|s| s.stage)
            .collect()
    }

    /// Output of the verification playbook, when it ran and succeeded
    pub fn verify_output(&self) -> Option<&str> {
        self.stage(Stage::Verify)
            .and_then(|s| s.result.output.as_deref())
            .filter(|out| !out.is_empty())
    }
}

pub struct Workflow<R, E = DebugMsgExtractor> {
    config: PilotConfig,
    runner: R,
    extractor: E,
    echo: bool,
}

impl<R: PlaybookRunner> Workflow<R, DebugMsgExtractor> {
    pub fn new(config: PilotConfig, runner: R) -> Self {
        Self::with_extractor(config, runner, DebugMsgExtractor::new())
    }
}

impl<R: PlaybookRunner, E: LoadExtractor> Workflow<R, E> {
    pub fn with_extractor(config: PilotConfig, runner: R, extractor: E) -> Self {
        Self {
            config,
            runner,
            extractor,
            echo: true,
        }
    }

    /// Do not print progress lines to stdout
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the whole workflow for the two candidate addresses.
    ///
    /// Runner failures end up in the report; only inventory writes can fail
    /// this call.
    pub async fn run(&self, first_address: &str, second_address: &str) -> Result<WorkflowReport, InventoryError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("workflow", run_id = %run_id);
        self.run_inner(run_id, first_address, second_address)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: String,
        first_address: &str,
        second_address: &str,
    ) -> Result<WorkflowReport, InventoryError> {
        let mut report = WorkflowReport {
            run_id,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            failure_policy: self.config.failure_policy,
            status: WorkflowStatus::Done,
            selection: None,
            stages: Vec::new(),
        };

        info!("Starting the PostgreSQL placement workflow.");
        self.progress("Initializing the process...");

        let user = &self.config.default_user;
        info!("Parsing addresses: {}, {}", first_address, second_address);
        let first = HostDescriptor::from_address(&self.config.candidates.first, first_address, user);
        let second = HostDescriptor::from_address(&self.config.candidates.second, second_address, user);

        // the grouped inventory comes late; refuse unusable fields before any playbook runs
        inventory::check_ini_host(&first)?;
        inventory::check_ini_host(&second)?;

        let files = &self.config.inventories;
        let playbooks = &self.config.playbooks;

        inventory::write_flat(&[first.clone(), second.clone()], &files.load_check).await?;

        self.progress("Running load check playbook...");
        let load_check = self
            .run_stage(Stage::LoadCheck, &files.load_check, &playbooks.load_check)
            .await;
        let output = load_check
            .result
            .output
            .clone()
            .filter(|out| !out.is_empty());
        report.stages.push(load_check);

        let Some(output) = output else {
            warn!("Load check playbook failed, aborting before host selection.");
            return Ok(self.finish(report, WorkflowStatus::Aborted { stage: Stage::LoadCheck }));
        };

        let first_load = self.extractor.extract(&output, &first.name);
        let second_load = self.extractor.extract(&output, &second.name);
        if first_load.is_empty() || second_load.is_empty() {
            warn!(
                "Incomplete load data ({}: {:?}, {}: {:?}); a host without samples scores 0.0",
                first.name, first_load, second.name, second_load
            );
        }

        info!("Comparing loads between {} and {}", first.name, second.name);
        let comparison = load::compare_loads(&first_load, &second_load, &self.config.load_weights);
        let selection = match comparison.winner {
            Candidate::First => Selection {
                chosen: first,
                other: second,
                chosen_load: first_load,
                other_load: second_load,
                comparison,
            },
            Candidate::Second => Selection {
                chosen: second,
                other: first,
                chosen_load: second_load,
                other_load: first_load,
                comparison,
            },
        };

        self.progress(&format!("Chosen server: {}", selection.chosen.name));
        info!(
            "Chosen server: {} (application server: {})",
            selection.chosen.name, selection.other.name
        );

        let chosen = selection.chosen.clone();
        let other = selection.other.clone();
        report.selection = Some(selection);

        inventory::write_flat(std::slice::from_ref(&chosen), &files.chosen).await?;
        self.progress("Installing PostgreSQL on the chosen server...");
        let install = self.run_stage(Stage::Install, &files.chosen, &playbooks.install).await;
        if let Some(status) = self.check_stage(&mut report, install) {
            return Ok(self.finish(report, status));
        }

        self.progress("Creating configuration inventory...");
        let groups = [
            InventoryGroup::new(&self.config.groups.storage, vec![chosen]),
            InventoryGroup::new(&self.config.groups.app, vec![other]),
        ];
        inventory::write_grouped(&groups, &files.config).await?;

        self.progress("Configuring PostgreSQL...");
        let configure = self.run_stage(Stage::Configure, &files.config, &playbooks.configure).await;
        if let Some(status) = self.check_stage(&mut report, configure) {
            return Ok(self.finish(report, status));
        }

        self.progress("Checking PostgreSQL installation...");
        let verify = self.run_stage(Stage::Verify, &files.chosen, &playbooks.verify).await;
        if let Some(status) = self.check_stage(&mut report, verify) {
            return Ok(self.finish(report, status));
        }

        let failed = report.failed_stages();
        if failed.is_empty() {
            info!("PostgreSQL placement workflow completed successfully.");
        } else {
            warn!("Workflow completed with failed stages: {:?}", failed);
        }
        Ok(self.finish(report, WorkflowStatus::Done))
    }

    async fn run_stage(&self, stage: Stage, inventory: &Path, playbook: &str) -> StageOutcome {
        let result = self.runner.run_playbook(inventory, playbook).await;
        StageOutcome {
            stage,
            playbook: playbook.to_string(),
            inventory: inventory.to_path_buf(),
            result,
        }
    }

    /// Record a post-selection stage; returns the abort status when the
    /// failure policy makes its failure fatal.
    fn check_stage(&self, report: &mut WorkflowReport, outcome: StageOutcome) -> Option<WorkflowStatus> {
        let stage = outcome.stage;
        let failed = !outcome.result.success;
        report.stages.push(outcome);

        if !failed {
            return None;
        }
        if self.config.failure_policy.is_fatal() {
            warn!("{} playbook failed, aborting (failure policy: fail_fast).", stage);
            Some(WorkflowStatus::Aborted { stage })
        } else {
            warn!("{} playbook failed, continuing (failure policy: best_effort).", stage);
            None
        }
    }

    fn finish(&self, mut report: WorkflowReport, status: WorkflowStatus) -> WorkflowReport {
        report.status = status;
        report.finished_at = Utc::now();
        report
    }

    fn progress(&self, line: &str) {
        if self.echo {
            println!("{}", line);
        }
    }
}
