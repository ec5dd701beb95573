use serde::{Deserialize, Serialize};

/// Address fragment parsed from a raw `host[:port]` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub address: String,
    pub port: Option<String>,
    pub user: String,
}

/// One candidate machine as ansible sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub name: String,
    pub address: String,
    pub port: Option<String>,
    pub user: String,
}

/// Split `host[:port]` on the first colon.
///
/// No validation happens here: a malformed address is handed to the runner,
/// which reports the failure itself. `"a:"` keeps an empty port so that it
/// stays distinguishable from `"a"`.
pub fn parse_address(raw: &str, default_user: &str) -> ParsedAddress {
    let (address, port) = match raw.split_once(':') {
        Some((host, port)) => (host, Some(port.to_string())),
        None => (raw, None),
    };

    ParsedAddress {
        address: address.to_string(),
        port,
        user: default_user.to_string(),
    }
}

impl HostDescriptor {
    pub fn new(name: impl Into<String>, parsed: ParsedAddress) -> Self {
        Self {
            name: name.into(),
            address: parsed.address,
            port: parsed.port,
            user: parsed.user,
        }
    }

    /// Build a named descriptor straight from a raw address
    pub fn from_address(name: impl Into<String>, raw: &str, default_user: &str) -> Self {
        Self::new(name, parse_address(raw, default_user))
    }

    /// Port to hand to ansible, `None` when absent or empty
    pub fn effective_port(&self) -> Option<&str> {
        self.port.as_deref().filter(|p| !p.is_empty())
    }
}
