//! State types for tracking provisioned resources.
//!
//! The state file records what was applied and what the API last reported
//! for it. It is the only link between a manifest entry and the remote
//! server or key it created, so losing an entry means losing track of a
//! billed machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ServerSpec, SshKeySpec};
use crate::ics::{Server, SshKey};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 50;

/// The complete deployment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Servers keyed by manifest name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerState>,
    /// SSH keys keyed by label.
    #[serde(default)]
    pub ssh_keys: BTreeMap<String, SshKeyState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations, oldest first.
    #[serde(default)]
    pub history: Vec<DeploymentHistoryEntry>,
}

/// A tracked server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerState {
    /// Definition the server was created from.
    pub spec: ServerSpec,
    /// Last record returned by the API.
    pub server: Server,
    /// When the server entered state.
    pub created_at: DateTime<Utc>,
    /// When the record was last refreshed or updated.
    pub updated_at: DateTime<Utc>,
}

/// A tracked SSH key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshKeyState {
    /// Definition the key was created from.
    pub spec: SshKeySpec,
    /// Last record returned by the API.
    pub key: SshKey,
    /// When the record was last refreshed.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the deployment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// When the operation occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: DeploymentOperation,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    /// Resource created.
    Create,
    /// Resource changed in place.
    Update,
    /// Resource destroyed and recreated.
    Replace,
    /// Resource destroyed.
    Delete,
    /// Existing resource adopted.
    Import,
    /// Records re-read from the API.
    Refresh,
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            servers: BTreeMap::new(),
            ssh_keys: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a server by manifest name.
    #[must_use]
    pub fn get_server(&self, name: &str) -> Option<&ServerState> {
        self.servers.get(name)
    }

    /// Adds or replaces a server.
    pub fn set_server(&mut self, server: ServerState) {
        self.servers.insert(server.spec.name.clone(), server);
        self.last_updated = Utc::now();
    }

    /// Removes a server by manifest name.
    pub fn remove_server(&mut self, name: &str) -> Option<ServerState> {
        let result = self.servers.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Gets an SSH key by label.
    #[must_use]
    pub fn get_ssh_key(&self, label: &str) -> Option<&SshKeyState> {
        self.ssh_keys.get(label)
    }

    /// Adds or replaces an SSH key.
    pub fn set_ssh_key(&mut self, key: SshKeyState) {
        self.ssh_keys.insert(key.spec.label.clone(), key);
        self.last_updated = Utc::now();
    }

    /// Removes an SSH key by label.
    pub fn remove_ssh_key(&mut self, label: &str) -> Option<SshKeyState> {
        let result = self.ssh_keys.remove(label);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.ssh_keys.is_empty()
    }

    /// Adds a history entry, dropping the oldest beyond the cap.
    pub fn add_history(&mut self, entry: DeploymentHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            let excess = self.history.len() + 1 - MAX_HISTORY;
            self.history.drain(..excess);
        }
        self.history.push(entry);
    }
}

impl ServerState {
    /// Records a newly created or imported server.
    #[must_use]
    pub fn new(spec: ServerSpec, server: Server) -> Self {
        let now = Utc::now();
        Self {
            spec,
            server,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the observed record.
    pub fn refresh(&mut self, server: Server) {
        self.server = server;
        self.updated_at = Utc::now();
    }
}

impl SshKeyState {
    /// Records a created or imported key.
    #[must_use]
    pub fn new(spec: SshKeySpec, key: SshKey) -> Self {
        Self {
            spec,
            key,
            updated_at: Utc::now(),
        }
    }

    /// Overwrites the observed record.
    pub fn refresh(&mut self, key: SshKey) {
        self.key = key;
        self.updated_at = Utc::now();
    }
}

impl DeploymentHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: DeploymentOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: DeploymentOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Import => "import",
            Self::Refresh => "refresh",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_capped() {
        let mut state = DeploymentState::new();
        for i in 0..(MAX_HISTORY + 5) {
            state.add_history(DeploymentHistoryEntry::new(
                DeploymentOperation::Create,
                vec![format!("server/{i}")],
            ));
        }

        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].resources, vec!["server/5"]);
    }

    #[test]
    fn test_server_keyed_by_manifest_name() {
        let mut state = DeploymentState::new();
        let spec = ServerSpec {
            name: String::from("web-1"),
            instance_type: String::from("c1.small"),
            location: String::from("NYC1"),
            operating_system: String::from("Ubuntu 24.04"),
            hostname: None,
            friendly_name: None,
            ssh_key_labels: vec![],
        };
        state.set_server(ServerState::new(spec, Server::default()));

        assert!(state.get_server("web-1").is_some());
        assert!(state.remove_server("web-1").is_some());
        assert!(state.is_empty());
    }
}
