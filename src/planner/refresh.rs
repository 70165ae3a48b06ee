//! Refreshing and adopting state.
//!
//! Refresh re-reads every tracked resource and overwrites the recorded
//! details. A resource that no longer exists is reported as drift and kept
//! in state until it is removed from the manifest or imported again.

use tracing::{debug, info, warn};

use crate::config::{Manifest, SshKeySpec};
use crate::error::{ConfigError, IcsError, Result, StateError};
use crate::ics::IcsApi;
use crate::provision::PollPolicy;
use crate::resources::{ServerController, SshKeyController};
use crate::state::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, ServerState, SshKeyState,
};

use super::diff::ResourceRef;

/// Re-reads and adopts resources.
pub struct Refresher<'a> {
    api: &'a dyn IcsApi,
}

/// Outcome of a refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Resources whose records were updated.
    pub refreshed: Vec<String>,
    /// Resources that were not found, with a reason.
    pub drifted: Vec<(String, String)>,
}

impl<'a> Refresher<'a> {
    /// Creates a refresher.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi) -> Self {
        Self { api }
    }

    /// Re-reads every resource in `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails. Missing resources are not
    /// errors here; they are returned in the report.
    pub async fn refresh(&self, state: &mut DeploymentState) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        if !state.servers.is_empty() {
            let servers = self.api.list_servers().await?;
            for (name, recorded) in &mut state.servers {
                let reference = ResourceRef::Server(name.clone()).to_string();
                let service_id = recorded.server.service_id;
                match servers.iter().find(|s| s.service_id == service_id) {
                    Some(server) => {
                        debug!("Refreshed {reference} (service ID {service_id})");
                        recorded.refresh(server.clone());
                        report.refreshed.push(reference);
                    }
                    None => {
                        warn!("{reference} (service ID {service_id}) was not found");
                        report
                            .drifted
                            .push((reference, format!("service ID {service_id} not found")));
                    }
                }
            }
        }

        if !state.ssh_keys.is_empty() {
            let keys = self.api.list_ssh_keys().await?;
            for (label, recorded) in &mut state.ssh_keys {
                let reference = ResourceRef::SshKey(label.clone()).to_string();
                match keys.iter().find(|k| &k.label == label) {
                    Some(key) => {
                        recorded.refresh(key.clone());
                        report.refreshed.push(reference);
                    }
                    None => {
                        warn!("{reference} was not found");
                        report
                            .drifted
                            .push((reference, format!("no SSH key labelled '{label}'")));
                    }
                }
            }
        }

        let mut resources = report.refreshed.clone();
        resources.extend(report.drifted.iter().map(|(r, _)| r.clone()));
        let entry = if report.has_drift() {
            DeploymentHistoryEntry::failed(
                DeploymentOperation::Refresh,
                resources,
                &format!("{} resource(s) missing", report.drifted.len()),
            )
        } else {
            DeploymentHistoryEntry::new(DeploymentOperation::Refresh, resources)
        };
        state.add_history(entry);

        info!("{report}");
        Ok(report)
    }

    /// Adopts an existing server under the manifest entry `name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the manifest has no such server, a
    /// state error if the name is already tracked, or the errors of
    /// [`ServerController::import`].
    pub async fn import_server(
        &self,
        manifest: &Manifest,
        state: &mut DeploymentState,
        service_id: &str,
        name: &str,
    ) -> Result<ServerState> {
        let spec = manifest.server(name).ok_or_else(|| {
            IcsError::Config(ConfigError::validation(
                "an imported server must be declared in the manifest first",
                format!("servers.{name}"),
            ))
        })?;
        if state.get_server(name).is_some() {
            return Err(StateError::AlreadyTracked {
                resource_type: String::from("server"),
                name: name.to_string(),
            }
            .into());
        }

        let server = ServerController::new(self.api, PollPolicy::default())
            .import(service_id)
            .await?;
        info!("Imported server {} as '{name}'", server.id);

        let tracked = ServerState::new(spec.clone(), server);
        state.set_server(tracked.clone());
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Import,
            vec![ResourceRef::Server(name.to_string()).to_string()],
        ));
        Ok(tracked)
    }

    /// Adopts an existing SSH key by label.
    ///
    /// The manifest entry is used when there is one; otherwise the key's own
    /// label and material become its recorded definition.
    ///
    /// # Errors
    ///
    /// Returns a state error if the label is already tracked, or the errors
    /// of [`SshKeyController::import`].
    pub async fn import_ssh_key(
        &self,
        manifest: &Manifest,
        state: &mut DeploymentState,
        label: &str,
    ) -> Result<SshKeyState> {
        if state.get_ssh_key(label).is_some() {
            return Err(StateError::AlreadyTracked {
                resource_type: String::from("ssh_key"),
                name: label.to_string(),
            }
            .into());
        }

        let key = SshKeyController::new(self.api).import(label).await?;
        let spec = manifest.ssh_key(label).cloned().unwrap_or_else(|| SshKeySpec {
            label: key.label.clone(),
            public_key: key.key.clone(),
        });
        info!("Imported SSH key '{label}' (ID: {})", key.id);

        let tracked = SshKeyState::new(spec, key);
        state.set_ssh_key(tracked.clone());
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Import,
            vec![ResourceRef::SshKey(label.to_string()).to_string()],
        ));
        Ok(tracked)
    }
}

impl RefreshReport {
    /// Returns true if any tracked resource was missing.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.drifted.is_empty()
    }
}

impl std::fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.drifted.is_empty() {
            write!(f, "Refreshed {} resource(s), no drift", self.refreshed.len())
        } else {
            write!(
                f,
                "Refreshed {} resource(s), {} missing",
                self.refreshed.len(),
                self.drifted.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerSpec;
    use crate::error::ResourceError;
    use crate::ics::fake::FakeIcs;
    use crate::ics::{Server, SshKey};

    fn spec(name: &str) -> ServerSpec {
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

    #[tokio::test]
    async fn test_refresh_fills_pending_and_reports_missing() {
        let api = FakeIcs::new();
        api.servers.lock().expect("servers").push(Server {
            id: String::from("srv-500"),
            service_id: 500,
            public_ip: String::from("192.0.2.10"),
            ..Server::default()
        });

        let mut state = DeploymentState::new();
        state.set_server(ServerState::new(
            spec("web-1"),
            Server {
                service_id: 500,
                ..Server::default()
            },
        ));
        state.set_server(ServerState::new(
            spec("web-2"),
            Server {
                id: String::from("srv-9"),
                service_id: 9,
                ..Server::default()
            },
        ));

        let report = Refresher::new(&api).refresh(&mut state).await.expect("refresh");

        assert_eq!(report.refreshed, vec!["server/web-1"]);
        assert_eq!(report.drifted.len(), 1);
        assert_eq!(report.drifted[0].0, "server/web-2");
        assert!(report.has_drift());

        assert_eq!(state.servers["web-1"].server.id, "srv-500");
        assert!(state.get_server("web-2").is_some());
        assert!(!state.history[0].success);
        assert_eq!(api.count("list_ssh_keys"), 0);
    }

    #[tokio::test]
    async fn test_refresh_keys() {
        let api = FakeIcs::new();
        api.ssh_keys.lock().expect("keys").push(SshKey {
            id: 7,
            label: String::from("ops"),
            key: String::from("ssh-ed25519 AAAA"),
            ..SshKey::default()
        });

        let mut state = DeploymentState::new();
        state.set_ssh_key(SshKeyState::new(
            SshKeySpec {
                label: String::from("ops"),
                public_key: String::from("ssh-ed25519 AAAA"),
            },
            SshKey::default(),
        ));

        let report = Refresher::new(&api).refresh(&mut state).await.expect("refresh");

        assert!(!report.has_drift());
        assert_eq!(state.ssh_keys["ops"].key.id, 7);
        assert_eq!(report.to_string(), "Refreshed 1 resource(s), no drift");
    }

    #[tokio::test]
    async fn test_import_server_requires_manifest_entry() {
        let api = FakeIcs::new();
        api.servers.lock().expect("servers").push(Server {
            id: String::from("srv-42"),
            service_id: 42,
            ..Server::default()
        });
        let manifest = Manifest {
            ssh_keys: vec![],
            servers: vec![spec("web-1")],
        };
        let mut state = DeploymentState::new();
        let refresher = Refresher::new(&api);

        let err = refresher
            .import_server(&manifest, &mut state, "42", "db-1")
            .await
            .unwrap_err();
        assert!(matches!(err, IcsError::Config(ConfigError::ValidationError { .. })));

        let tracked = refresher
            .import_server(&manifest, &mut state, "42", "web-1")
            .await
            .expect("imported");
        assert_eq!(tracked.server.id, "srv-42");
        assert_eq!(state.history[0].operation, DeploymentOperation::Import);

        let err = refresher
            .import_server(&manifest, &mut state, "42", "web-1")
            .await
            .unwrap_err();
        assert!(matches!(err, IcsError::State(StateError::AlreadyTracked { .. })));
    }

    #[tokio::test]
    async fn test_import_ssh_key_without_manifest_entry() {
        let api = FakeIcs::new();
        api.ssh_keys.lock().expect("keys").push(SshKey {
            id: 7,
            label: String::from("laptop"),
            key: String::from("ssh-ed25519 CCCC"),
            ..SshKey::default()
        });
        let mut state = DeploymentState::new();
        let refresher = Refresher::new(&api);

        let tracked = refresher
            .import_ssh_key(&Manifest::default(), &mut state, "laptop")
            .await
            .expect("imported");
        assert_eq!(tracked.spec.public_key, "ssh-ed25519 CCCC");

        let err = refresher
            .import_ssh_key(&Manifest::default(), &mut state, "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IcsError::Resource(ResourceError::SshKeyNotFound { .. })
        ));
    }
}
