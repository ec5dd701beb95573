//! Configuration for a pgpilot run
//!
//! Handles:
//! - Default SSH user handed to ansible
//! - Inventory file locations and playbook names
//! - Candidate host labels and inventory group names
//! - Load weights and the stage failure policy
//!
//! The loaded value is immutable and handed to the workflow at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::inventory::check_ini_token;

pub const DEFAULT_CONFIG_FILE: &str = "pgpilot.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub default_user: String,
    pub runner: RunnerConfig,
    pub inventories: InventoryFiles,
    pub playbooks: Playbooks,
    pub candidates: Candidates,
    pub groups: GroupNames,
    /// Weights applied to the load samples, in order. They sum to 0.8 and
    /// are not normalized.
    pub load_weights: [f64; 2],
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub program: String,
    /// Extra arguments placed before `-i <inventory> <playbook>`
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryFiles {
    /// Flat inventory with both candidates, used by the load check
    pub load_check: PathBuf,
    /// Flat inventory with the chosen host only
    pub chosen: PathBuf,
    /// Grouped inventory used by the configuration playbook
    pub config: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Playbooks {
    pub load_check: String,
    pub install: String,
    pub configure: String,
    pub verify: String,
}

/// Labels given to the two addresses, in command-line order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Candidates {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupNames {
    pub storage: String,
    pub app: String,
}

/// What happens when the install, configure or verify playbook fails.
/// A failed load check always aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed stage
    #[default]
    FailFast,
    /// Record the failure and keep going
    BestEffort,
}

impl FailurePolicy {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailurePolicy::FailFast)
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            default_user: "root".to_string(),
            runner: RunnerConfig::default(),
            inventories: InventoryFiles::default(),
            playbooks: Playbooks::default(),
            candidates: Candidates::default(),
            groups: GroupNames::default(),
            load_weights: [0.5, 0.3],
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "ansible-playbook".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for InventoryFiles {
    fn default() -> Self {
        Self {
            load_check: PathBuf::from("inventory.yml"),
            chosen: PathBuf::from("chosen.yml"),
            config: PathBuf::from("configtory.ini"),
        }
    }
}

impl Default for Playbooks {
    fn default() -> Self {
        Self {
            load_check: "load_check.yml".to_string(),
            install: "install_postgres.yml".to_string(),
            configure: "config_postgres.yml".to_string(),
            verify: "check_postgres.yml".to_string(),
        }
    }
}

impl Default for Candidates {
    fn default() -> Self {
        Self {
            first: "Debian".to_string(),
            second: "Almalinux".to_string(),
        }
    }
}

impl Default for GroupNames {
    fn default() -> Self {
        Self {
            storage: "postgres_servers".to_string(),
            app: "app_servers".to_string(),
        }
    }
}

impl PilotConfig {
    /// Config file location: the path given on the command line (which
    /// clap also fills from `PGPILOT_CONFIG`), else `pgpilot.yaml`
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load config from disk. A missing or blank file yields the defaults;
    /// a file that exists but does not parse is an error.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: PilotConfig = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.program.trim().is_empty() {
            return Err(ConfigError::Invalid("runner.program is empty".into()));
        }
        if self.load_weights.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "load_weights must be finite, got {:?}",
                self.load_weights
            )));
        }
        if self.candidates.first == self.candidates.second {
            return Err(ConfigError::Invalid(format!(
                "candidate names must differ, both are '{}'",
                self.candidates.first
            )));
        }
        if self.groups.storage == self.groups.app {
            return Err(ConfigError::Invalid(format!(
                "group names must differ, both are '{}'",
                self.groups.storage
            )));
        }

        // these end up as bare tokens in the grouped INI inventory
        let tokens = [
            ("default_user", &self.default_user),
            ("candidates.first", &self.candidates.first),
            ("candidates.second", &self.candidates.second),
            ("groups.storage", &self.groups.storage),
            ("groups.app", &self.groups.app),
        ];
        for (field, value) in tokens {
            check_ini_token(field, value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Rebase every inventory file under `dir`
    pub fn with_inventory_dir(mut self, dir: &Path) -> Self {
        self.inventories.load_check = dir.join(&self.inventories.load_check);
        self.inventories.chosen = dir.join(&self.inventories.chosen);
        self.inventories.config = dir.join(&self.inventories.config);
        self
    }
}
