//! Ansible inventory rendering
//!
//! Two layouts are produced:
//! - flat YAML (`all.hosts`), used for the load check and the install run
//! - grouped INI (`[group]` sections), used for the configuration run
//!
//! The YAML layout goes through `serde_yaml`, so any host value is quoted as
//! needed. The INI layout has no quoting; values that would break a line are
//! refused. Rendering is pure; the write helpers replace the whole file.

use crate::models::HostDescriptor;
use serde_yaml::{Mapping, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to write inventory {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render inventory: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("{field} '{value}' cannot be written to an INI inventory")]
    InvalidField { field: &'static str, value: String },
}

/// Named section of a grouped inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryGroup {
    pub name: String,
    pub hosts: Vec<HostDescriptor>,
}

impl InventoryGroup {
    pub fn new(name: impl Into<String>, hosts: Vec<HostDescriptor>) -> Self {
        Self {
            name: name.into(),
            hosts,
        }
    }
}

/// A grouped inventory line is `name key=value ...` under a `[group]` header;
/// a token must be non-empty and free of separators.
pub fn check_ini_token(field: &'static str, value: &str) -> Result<(), InventoryError> {
    let breaks_line = |c: char| c.is_whitespace() || matches!(c, '=' | '[' | ']' | '#');
    if value.is_empty() || value.chars().any(breaks_line) {
        return Err(InventoryError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Every field of `host` that ends up in a grouped inventory
pub fn check_ini_host(host: &HostDescriptor) -> Result<(), InventoryError> {
    check_ini_token("host name", &host.name)?;
    check_ini_token("ansible_host", &host.address)?;
    check_ini_token("ansible_user", &host.user)?;
    if let Some(port) = host.effective_port() {
        check_ini_token("ansible_port", port)?;
    }
    Ok(())
}

pub fn render_flat(hosts: &[HostDescriptor]) -> Result<String, InventoryError> {
    let mut listed = Mapping::new();
    for host in hosts {
        let mut vars = Mapping::new();
        vars.insert("ansible_host".into(), Value::String(host.address.clone()));
        vars.insert("ansible_user".into(), Value::String(host.user.clone()));
        if let Some(port) = host.effective_port() {
            let port = match port.parse::<u16>() {
                Ok(number) => Value::from(number),
                Err(_) => Value::String(port.to_string()),
            };
            vars.insert("ansible_port".into(), port);
        }
        listed.insert(Value::String(host.name.clone()), Value::Mapping(vars));
    }

    let mut all = Mapping::new();
    all.insert("hosts".into(), Value::Mapping(listed));
    let mut doc = Mapping::new();
    doc.insert("all".into(), Value::Mapping(all));

    Ok(format!("---\n{}", serde_yaml::to_string(&doc)?))
}

/// Sections come out in slice order
pub fn render_grouped(groups: &[InventoryGroup]) -> Result<String, InventoryError> {
    let mut out = String::new();
    for group in groups {
        check_ini_token("group name", &group.name)?;
        // writing into a String cannot fail
        let _ = writeln!(out, "[{}]", group.name);
        for host in &group.hosts {
            check_ini_host(host)?;
            let _ = write!(
                out,
                "{} ansible_host={} ansible_user={}",
                host.name, host.address, host.user
            );
            if let Some(port) = host.effective_port() {
                let _ = write!(out, " ansible_port={}", port);
            }
            out.push('\n');
        }
    }
    Ok(out)
}

pub async fn write_flat(hosts: &[HostDescriptor], path: &Path) -> Result<(), InventoryError> {
    info!("Creating inventory file: {}", path.display());
    write_inventory(path, render_flat(hosts)?).await?;
    info!("Inventory file {} created successfully ({} hosts)", path.display(), hosts.len());
    Ok(())
}

pub async fn write_grouped(groups: &[InventoryGroup], path: &Path) -> Result<(), InventoryError> {
    info!("Creating configuration inventory file: {}", path.display());
    write_inventory(path, render_grouped(groups)?).await?;
    info!("Configuration inventory file {} created successfully", path.display());
    Ok(())
}

async fn write_inventory(path: &Path, content: String) -> Result<(), InventoryError> {
    fs::write(path, content).await.map_err(|source| InventoryError::Write {
        path: path.to_path_buf(),
        source,
    })
}
