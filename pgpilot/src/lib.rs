//! pgpilot - PostgreSQL host placement driven by measured load
//!
//! Picks the less loaded of two machines as database host and drives the
//! ansible rollout against it:
//! - Inventory generation (flat YAML and grouped INI)
//! - Playbook execution through `ansible-playbook`
//! - Load extraction from the runner's debug output
//! - Weighted comparison of the two candidates

pub mod config;
pub mod inventory;
pub mod load;
pub mod models;
pub mod runner;
pub mod workflow;

pub use config::{FailurePolicy, PilotConfig};
pub use models::{parse_address, HostDescriptor};
pub use runner::{AnsibleRunner, ExecutionResult, PlaybookRunner};
pub use workflow::{Stage, Workflow, WorkflowReport, WorkflowStatus};
