/*!
Readers for generated inventories

Parse the flat YAML and grouped INI inventories back into host descriptors so
tests can assert on structure instead of raw text.
*/

use anyhow::{anyhow, bail, Result};
use pgpilot::HostDescriptor;
use serde_yaml::Value;

/// One `[group]` section of a grouped inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedSection {
    pub name: String,
    pub hosts: Vec<HostDescriptor>,
}

/// Hosts listed under `all.hosts`, in file order
pub fn read_flat_inventory(content: &str) -> Result<Vec<HostDescriptor>> {
    let doc: Value = serde_yaml::from_str(content)?;
    let hosts = doc
        .get("all")
        .and_then(|all| all.get("hosts"))
        .and_then(|hosts| hosts.as_mapping())
        .ok_or_else(|| anyhow!("missing all.hosts mapping"))?;

    hosts
        .iter()
        .map(|(name, vars)| {
            let name = scalar(name).ok_or_else(|| anyhow!("host name is not a scalar"))?;
            let field = |key: &str| vars.get(key).and_then(scalar);
            Ok(HostDescriptor {
                address: field("ansible_host").ok_or_else(|| anyhow!("{} has no ansible_host", name))?,
                user: field("ansible_user").ok_or_else(|| anyhow!("{} has no ansible_user", name))?,
                port: field("ansible_port"),
                name,
            })
        })
        .collect()
}

/// Sections of an INI inventory, in file order
pub fn read_grouped_inventory(content: &str) -> Result<Vec<GroupedSection>> {
    let mut sections: Vec<GroupedSection> = Vec::new();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(group) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push(GroupedSection {
                name: group.to_string(),
                hosts: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            bail!("host line outside of any group: {}", line);
        };

        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let mut host = HostDescriptor {
            name,
            address: String::new(),
            port: None,
            user: String::new(),
        };
        for pair in parts {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got {}", pair))?;
            match key {
                "ansible_host" => host.address = value.to_string(),
                "ansible_user" => host.user = value.to_string(),
                "ansible_port" => host.port = Some(value.to_string()),
                other => bail!("unexpected key {}", other),
            }
        }
        section.hosts.push(host);
    }

    Ok(sections)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
