//! Resource manifest types.
//!
//! This module defines the structs that map to `ics.resources.yaml`. The
//! manifest is declarative: it describes the servers and SSH keys that
//! should exist, and the planner works out how to get there.

use serde::{Deserialize, Serialize};

/// The root of a resource manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// SSH keys to register.
    #[serde(default)]
    pub ssh_keys: Vec<SshKeySpec>,
    /// Servers to provision.
    #[serde(default)]
    pub servers: Vec<ServerSpec>,
}

/// Desired state of an SSH key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshKeySpec {
    /// Unique label; the key's identity on the account.
    pub label: String,
    /// Public key material.
    pub public_key: String,
}

/// Desired state of a bare-metal server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSpec {
    /// Local handle, unique within the manifest.
    pub name: String,
    /// Instance type (e.g. `c1.small`).
    pub instance_type: String,
    /// Location code (e.g. `NYC1`).
    pub location: String,
    /// Operating system display name (e.g. `Ubuntu 24.04`).
    pub operating_system: String,
    /// Hostname to request at order time.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Display name, the only attribute that can change in place.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Labels of SSH keys to install.
    #[serde(default)]
    pub ssh_key_labels: Vec<String>,
}

/// Server attributes whose change forces a replacement.
pub const SERVER_REPLACEMENT_FIELDS: &[&str] = &[
    "instance_type",
    "location",
    "operating_system",
    "hostname",
    "ssh_key_labels",
];

impl Manifest {
    /// Finds a server spec by name.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&ServerSpec> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Finds an SSH key spec by label.
    #[must_use]
    pub fn ssh_key(&self, label: &str) -> Option<&SshKeySpec> {
        self.ssh_keys.iter().find(|k| k.label == label)
    }

    /// Returns true if the manifest declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.ssh_keys.is_empty()
    }
}

impl ServerSpec {
    /// Lists the replacement-forcing fields that differ from `other`.
    ///
    /// The friendly name is deliberately not compared here; see
    /// [`Self::friendly_name_changed`].
    #[must_use]
    pub fn replacement_changes(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.instance_type != other.instance_type {
            changed.push(SERVER_REPLACEMENT_FIELDS[0]);
        }
        if self.location != other.location {
            changed.push(SERVER_REPLACEMENT_FIELDS[1]);
        }
        if self.operating_system != other.operating_system {
            changed.push(SERVER_REPLACEMENT_FIELDS[2]);
        }
        if self.hostname != other.hostname {
            changed.push(SERVER_REPLACEMENT_FIELDS[3]);
        }
        if self.ssh_key_labels != other.ssh_key_labels {
            changed.push(SERVER_REPLACEMENT_FIELDS[4]);
        }
        changed
    }

    /// Returns true if the desired friendly name differs from `other`'s and is set.
    ///
    /// Unsetting a friendly name is not propagated; the backend keeps the last one.
    #[must_use]
    pub fn friendly_name_changed(&self, other: &Self) -> bool {
        self.friendly_name.is_some() && self.friendly_name != other.friendly_name
    }
}

impl SshKeySpec {
    /// Lists the fields that differ from `other`. Any difference forces replacement.
    #[must_use]
    pub fn changes(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.label != other.label {
            changed.push("label");
        }
        if self.public_key != other.public_key {
            changed.push("public_key");
        }
        changed
    }
}
