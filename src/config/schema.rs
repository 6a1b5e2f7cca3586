use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;

/// Deployment role a host is provisioned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Search,
    Sensor,
}

impl Role {
    /// All roles, in the order hosts are rendered.
    pub const ALL: [Role; 3] = [Role::Manager, Role::Search, Role::Sensor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Search => "search",
            Role::Sensor => "sensor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: Vec<HostRecord>,
    #[serde(default)]
    pub search: Vec<HostRecord>,
    #[serde(default)]
    pub sensor: Vec<HostRecord>,
    /// Generate an SSH keypair and expose it to every template.
    #[serde(default)]
    pub inject_ssh_keys: bool,
    /// Any other global keys templates may reference.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Config {
    pub fn hosts(&self, role: Role) -> &[HostRecord] {
        match role {
            Role::Manager => &self.manager,
            Role::Search => &self.search,
            Role::Sensor => &self.sensor,
        }
    }

    /// Total host count across all role categories.
    pub fn host_count(&self) -> usize {
        Role::ALL.iter().map(|role| self.hosts(*role).len()).sum()
    }
}

/// One host entry within a role category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// Names every generated per-host artifact, so it must be
    /// filesystem-path-safe.
    pub hostname: String,
    /// Optional file name under the partition-tables directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_part_table: Option<String>,
    /// Role-specific fields passed through to templates untouched.
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}
