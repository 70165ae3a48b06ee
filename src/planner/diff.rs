//! Diff engine for comparing the manifest with recorded state.
//!
//! The diff is computed against state only; drift between state and the
//! API is the job of `refresh`.

use std::fmt;
use tracing::debug;

use crate::config::{Manifest, ServerSpec, SshKeySpec};
use crate::state::DeploymentState;

/// Engine for computing diffs between the manifest and state.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// A resource addressed by kind and local key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceRef {
    /// A server by manifest name.
    Server(String),
    /// An SSH key by label.
    SshKey(String),
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource concerned.
    pub resource: ResourceRef,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Field-level details.
    pub details: Vec<DiffDetail>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// In the manifest, not in state.
    Create,
    /// Only in-place fields differ.
    Update,
    /// A replacement-forcing field differs.
    Replace,
    /// In state, not in the manifest.
    Delete,
    /// Identical.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Recorded value.
    pub old_value: Option<String>,
    /// Desired value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs, unchanged ones included.
    pub diffs: Vec<ResourceDiff>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the diff between the manifest and recorded state.
    #[must_use]
    pub fn compute(&self, manifest: &Manifest, state: &DeploymentState) -> DiffResult {
        let mut diffs = Vec::new();

        for desired in &manifest.ssh_keys {
            let diff = state.get_ssh_key(&desired.label).map_or_else(
                || ResourceDiff {
                    resource: ResourceRef::SshKey(desired.label.clone()),
                    diff_type: DiffType::Create,
                    details: vec![],
                },
                |recorded| Self::ssh_key_diff(&recorded.spec, desired),
            );
            diffs.push(diff);
        }

        for label in state.ssh_keys.keys() {
            if manifest.ssh_key(label).is_none() {
                debug!("SSH key {label} is no longer in the manifest");
                diffs.push(ResourceDiff {
                    resource: ResourceRef::SshKey(label.clone()),
                    diff_type: DiffType::Delete,
                    details: vec![],
                });
            }
        }

        for desired in &manifest.servers {
            let diff = state.get_server(&desired.name).map_or_else(
                || ResourceDiff {
                    resource: ResourceRef::Server(desired.name.clone()),
                    diff_type: DiffType::Create,
                    details: vec![],
                },
                |recorded| Self::server_diff(&recorded.spec, desired),
            );
            diffs.push(diff);
        }

        for name in state.servers.keys() {
            if manifest.server(name).is_none() {
                debug!("Server {name} is no longer in the manifest");
                diffs.push(ResourceDiff {
                    resource: ResourceRef::Server(name.clone()),
                    diff_type: DiffType::Delete,
                    details: vec![],
                });
            }
        }

        DiffResult { diffs }
    }

    fn ssh_key_diff(current: &SshKeySpec, desired: &SshKeySpec) -> ResourceDiff {
        let details: Vec<DiffDetail> = desired
            .changes(current)
            .into_iter()
            .map(|field| DiffDetail {
                field: field.to_string(),
                old_value: Some(ssh_key_field(current, field)),
                new_value: Some(ssh_key_field(desired, field)),
            })
            .collect();

        ResourceDiff {
            resource: ResourceRef::SshKey(desired.label.clone()),
            diff_type: if details.is_empty() {
                DiffType::NoChange
            } else {
                DiffType::Replace
            },
            details,
        }
    }

    fn server_diff(current: &ServerSpec, desired: &ServerSpec) -> ResourceDiff {
        let replacement = desired.replacement_changes(current);
        let rename = desired.friendly_name_changed(current);

        let mut details: Vec<DiffDetail> = replacement
            .iter()
            .map(|field| DiffDetail {
                field: (*field).to_string(),
                old_value: server_field(current, field),
                new_value: server_field(desired, field),
            })
            .collect();

        if rename {
            details.push(DiffDetail {
                field: String::from("friendly_name"),
                old_value: current.friendly_name.clone(),
                new_value: desired.friendly_name.clone(),
            });
        }

        let diff_type = if !replacement.is_empty() {
            DiffType::Replace
        } else if rename {
            DiffType::Update
        } else {
            DiffType::NoChange
        };

        ResourceDiff {
            resource: ResourceRef::Server(desired.name.clone()),
            diff_type,
            details,
        }
    }
}

fn ssh_key_field(spec: &SshKeySpec, field: &str) -> String {
    match field {
        "label" => spec.label.clone(),
        _ => spec.public_key.clone(),
    }
}

fn server_field(spec: &ServerSpec, field: &str) -> Option<String> {
    match field {
        "instance_type" => Some(spec.instance_type.clone()),
        "location" => Some(spec.location.clone()),
        "operating_system" => Some(spec.operating_system.clone()),
        "hostname" => spec.hostname.clone(),
        "ssh_key_labels" => Some(spec.ssh_key_labels.join(", ")),
        _ => None,
    }
}

impl DiffResult {
    /// Counts diffs of a given type.
    #[must_use]
    pub fn count(&self, diff_type: DiffType) -> usize {
        self.diffs.iter().filter(|d| d.diff_type == diff_type).count()
    }

    /// Returns true if anything differs.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diffs.iter().any(|d| d.diff_type != DiffType::NoChange)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(name) => write!(f, "server/{name}"),
            Self::SshKey(label) => write!(f, "ssh_key/{label}"),
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::{Server, SshKey};
    use crate::state::{ServerState, SshKeyState};

    fn server(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            instance_type: String::from("c1.small"),
            location: String::from("NYC1"),
            operating_system: String::from("Ubuntu 24.04"),
            hostname: None,
            friendly_name: None,
            ssh_key_labels: vec![],
        }
    }

    fn key(label: &str) -> SshKeySpec {
        SshKeySpec {
            label: label.to_string(),
            public_key: String::from("ssh-ed25519 AAAA ops@example"),
        }
    }

    fn state_with(servers: &[ServerSpec], keys: &[SshKeySpec]) -> DeploymentState {
        let mut state = DeploymentState::new();
        for spec in servers {
            state.set_server(ServerState::new(spec.clone(), Server::default()));
        }
        for spec in keys {
            state.set_ssh_key(SshKeyState::new(spec.clone(), SshKey::default()));
        }
        state
    }

    #[test]
    fn test_empty_state_creates_everything() {
        let manifest = Manifest {
            ssh_keys: vec![key("ops")],
            servers: vec![server("web-1")],
        };
        let diff = DiffEngine::new().compute(&manifest, &DeploymentState::new());

        assert_eq!(diff.count(DiffType::Create), 2);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_classifies_changes() {
        let recorded = state_with(
            &[server("web-1"), server("web-2"), server("old")],
            &[key("ops"), key("gone")],
        );

        let mut renamed = server("web-1");
        renamed.friendly_name = Some(String::from("front"));
        let mut moved = server("web-2");
        moved.location = String::from("ORD1");
        let mut rotated = key("ops");
        rotated.public_key = String::from("ssh-ed25519 BBBB ops@example");

        let manifest = Manifest {
            ssh_keys: vec![rotated],
            servers: vec![renamed, moved],
        };
        let diff = DiffEngine::new().compute(&manifest, &recorded);

        let find = |r: ResourceRef| {
            diff.diffs
                .iter()
                .find(|d| d.resource == r)
                .map(|d| d.diff_type)
        };
        assert_eq!(find(ResourceRef::Server(String::from("web-1"))), Some(DiffType::Update));
        assert_eq!(find(ResourceRef::Server(String::from("web-2"))), Some(DiffType::Replace));
        assert_eq!(find(ResourceRef::Server(String::from("old"))), Some(DiffType::Delete));
        assert_eq!(find(ResourceRef::SshKey(String::from("ops"))), Some(DiffType::Replace));
        assert_eq!(find(ResourceRef::SshKey(String::from("gone"))), Some(DiffType::Delete));

        let moved_diff = diff
            .diffs
            .iter()
            .find(|d| d.resource == ResourceRef::Server(String::from("web-2")))
            .expect("web-2");
        assert_eq!(
            moved_diff.details,
            vec![DiffDetail {
                field: String::from("location"),
                old_value: Some(String::from("NYC1")),
                new_value: Some(String::from("ORD1")),
            }]
        );
    }

    #[test]
    fn test_identical_is_no_change() {
        let recorded = state_with(&[server("web-1")], &[key("ops")]);
        let manifest = Manifest {
            ssh_keys: vec![key("ops")],
            servers: vec![server("web-1")],
        };
        let diff = DiffEngine::new().compute(&manifest, &recorded);

        assert!(!diff.has_changes());
        assert_eq!(diff.count(DiffType::NoChange), 2);
    }
}
