/*!
# pgpilot DevKit - Stubs and utilities for workflow tests

Helpers for exercising pgpilot without ansible or remote hosts:
- Scripted playbook runner recording every invocation
- Builders for ansible-playbook style output
- Readers for the generated inventories
- Test harness wiring a workflow into a scratch directory
*/

pub mod runner_stub;
pub mod inventory_helpers;
pub mod test_utils;

pub use runner_stub::{AnsibleOutputBuilder, Invocation, ScriptedRunner};
pub use inventory_helpers::{read_flat_inventory, read_grouped_inventory, GroupedSection};
pub use test_utils::{LogCapture, TestHarness};
