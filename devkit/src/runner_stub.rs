/*!
Scripted playbook runner for development without ansible

Stands in for `AnsibleRunner`: answers each playbook with a canned result and
records every invocation, including a snapshot of the inventory file as it
was when the playbook "ran".
*/

use async_trait::async_trait;
use pgpilot::{ExecutionResult, PlaybookRunner};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Invocation {
    pub inventory: PathBuf,
    pub playbook: String,
    /// Inventory content at call time, `None` if the file was missing
    pub inventory_content: Option<String>,
}

/// Runner returning scripted results per playbook
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<HashMap<String, ExecutionResult>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of a playbook; unscripted playbooks succeed with a bare recap
    pub fn respond(&self, playbook: &str, result: ExecutionResult) -> &Self {
        self.responses.lock().unwrap().insert(playbook.to_string(), result);
        self
    }

    pub fn succeed_with(&self, playbook: &str, output: impl Into<String>) -> &Self {
        self.respond(playbook, ExecutionResult::succeeded(output))
    }

    pub fn fail_with(&self, playbook: &str, exit_code: i32, stderr: &str) -> &Self {
        self.respond(playbook, ExecutionResult::failed(Some(exit_code), stderr))
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Playbooks in call order
    pub fn played(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.playbook).collect()
    }

    pub fn find_invocation(&self, playbook: &str) -> Option<Invocation> {
        self.invocations().into_iter().find(|i| i.playbook == playbook)
    }

    pub fn clear(&self) {
        self.responses.lock().unwrap().clear();
        self.invocations.lock().unwrap().clear();
    }
}

#[async_trait]
impl PlaybookRunner for ScriptedRunner {
    async fn run_playbook(&self, inventory: &Path, playbook: &str) -> ExecutionResult {
        let inventory_content = tokio::fs::read_to_string(inventory).await.ok();
        self.invocations.lock().unwrap().push(Invocation {
            inventory: inventory.to_path_buf(),
            playbook: playbook.to_string(),
            inventory_content,
        });

        tracing::debug!("[stub] playbook {} against {}", playbook, inventory.display());

        let result = self
            .responses
            .lock()
            .unwrap()
            .get(playbook)
            .cloned()
            .unwrap_or_else(|| ExecutionResult::succeeded(AnsibleOutputBuilder::new("stub").build()));

        // same log line the real runner emits for a non-zero exit
        if !result.success {
            tracing::error!(
                "Playbook {} failed with error: {}",
                playbook,
                result.error.as_deref().unwrap_or_default().trim_end()
            );
        }
        result
    }
}

/// Builds text shaped like `ansible-playbook` stdout
pub struct AnsibleOutputBuilder {
    play: String,
    tasks: Vec<String>,
    recap: Vec<String>,
}

impl AnsibleOutputBuilder {
    pub fn new<S: Into<String>>(play: S) -> Self {
        Self {
            play: play.into(),
            tasks: Vec::new(),
            recap: Vec::new(),
        }
    }

    /// Debug task printing load samples for one host
    pub fn host_loads(mut self, host: &str, loads: &[f64]) -> Self {
        let items: Vec<String> = loads.iter().map(|l| format!("        \"{:.2}\"", l)).collect();
        self.tasks.push(format!(
            "ok: [{}] => {{\n    \"msg\": [\n{}\n    ]\n}}",
            host,
            items.join(",\n")
        ));
        self.recap.push(format!("{:<26} : ok=2    changed=0    unreachable=0    failed=0", host));
        self
    }

    /// Host that could not be reached
    pub fn unreachable_host(mut self, host: &str, message: &str) -> Self {
        self.tasks.push(format!(
            "fatal: [{}]: UNREACHABLE! => {{\"changed\": false, \"msg\": \"{}\", \"unreachable\": true}}",
            host, message
        ));
        self.recap.push(format!("{:<26} : ok=0    changed=0    unreachable=1    failed=0", host));
        self
    }

    /// Free-form line inside the task section
    pub fn line<S: Into<String>>(mut self, line: S) -> Self {
        self.tasks.push(line.into());
        self
    }

    pub fn build(&self) -> String {
        let mut out = format!("\nPLAY [{}] ***\n\nTASK [Gathering Facts] ***\n", self.play);
        for task in &self.tasks {
            out.push_str(task);
            out.push('\n');
        }
        out.push_str("\nPLAY RECAP ***\n");
        for line in &self.recap {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
