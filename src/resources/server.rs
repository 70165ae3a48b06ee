//! Bare-metal server lifecycle.

use tracing::{info, warn};

use crate::config::ServerSpec;
use crate::error::{ResourceError, Result};
use crate::ics::{IcsApi, Server};
use crate::provision::{
    CancelSignal, CatalogResolver, OrderOrchestrator, PollPolicy, ProvisioningPoller,
};

use super::UpdateOutcome;

/// A freshly provisioned server.
#[derive(Debug, Clone)]
pub struct CreatedServer {
    /// The server record as listed by the API.
    pub server: Server,
    /// Problems that did not fail the create.
    pub warnings: Vec<String>,
}

/// Creates, reads, updates, deletes and imports servers.
pub struct ServerController<'a> {
    api: &'a dyn IcsApi,
    policy: PollPolicy,
}

impl<'a> ServerController<'a> {
    /// Creates a controller.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Provisions a server.
    ///
    /// Validation (instance type, location, operating system, SSH key labels)
    /// completes before the order is submitted. Once ordered, the call waits
    /// for the server to appear and then applies the friendly name; a failed
    /// rename is reported as a warning.
    ///
    /// # Errors
    ///
    /// Returns a resolution error before anything is ordered, an order error,
    /// or a provisioning error after the order was placed.
    pub async fn create(
        &self,
        spec: &ServerSpec,
        cancel: &mut CancelSignal,
    ) -> Result<CreatedServer> {
        info!("Creating server '{}' ({} in {})", spec.name, spec.instance_type, spec.location);

        let resolver = CatalogResolver::new(self.api);
        let sku = resolver.resolve(&spec.instance_type, &spec.location).await?;
        let operating_system = resolver
            .resolve_operating_system(
                &sku.sku_product_name,
                &sku.location_code,
                &spec.operating_system,
            )
            .await?;

        let service_id = OrderOrchestrator::new(self.api)
            .submit(
                &sku,
                &operating_system,
                spec.hostname.as_deref(),
                &spec.ssh_key_labels,
            )
            .await?;

        let mut server = ProvisioningPoller::new(self.api, self.policy)
            .await_provisioning(service_id, cancel)
            .await?;

        let mut warnings = Vec::new();
        if let Some(name) = spec.friendly_name.as_deref().filter(|n| !n.is_empty()) {
            info!("Setting friendly name of server {} to '{name}'", server.id);
            match self.api.update_friendly_name(&server.id, name).await {
                Ok(()) => server.friendly_name = name.to_string(),
                Err(e) => {
                    warn!("Failed to set friendly name on server {}: {e}", server.id);
                    warnings.push(format!(
                        "Server '{}' was provisioned successfully but failed to set friendly name: {e}",
                        spec.name
                    ));
                }
            }
        }

        info!(
            "Server '{}' provisioned (id {}, service ID {}, ip {})",
            spec.name, server.id, server.service_id, server.public_ip
        );

        Ok(CreatedServer { server, warnings })
    }

    /// Re-fetches a server by service ID.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ServerNotFound`] if no server carries the
    /// service ID, or a transport error.
    pub async fn read(&self, service_id: u64) -> Result<Server> {
        let servers = self.api.list_servers().await?;
        servers
            .into_iter()
            .find(|s| s.service_id == service_id)
            .ok_or_else(|| ResourceError::ServerNotFound { service_id }.into())
    }

    /// Applies a definition change.
    ///
    /// Only the friendly name can change in place. Any other difference is
    /// reported as [`UpdateOutcome::RequiresReplacement`] without calling the
    /// API.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename call fails.
    pub async fn update(
        &self,
        server_id: &str,
        current: &ServerSpec,
        desired: &ServerSpec,
    ) -> Result<UpdateOutcome> {
        let fields = desired.replacement_changes(current);
        if !fields.is_empty() {
            warn!(
                "Server '{}' requires replacement: {} changed",
                desired.name,
                fields.join(", ")
            );
            return Ok(UpdateOutcome::RequiresReplacement { fields });
        }

        match desired.friendly_name.as_deref() {
            Some(name) if desired.friendly_name_changed(current) => {
                info!("Updating friendly name of server {server_id} to '{name}'");
                self.api.update_friendly_name(server_id, name).await?;
                Ok(UpdateOutcome::InPlace {
                    fields: vec!["friendly_name"],
                })
            }
            _ => Ok(UpdateOutcome::NoChange),
        }
    }

    /// Cancels a server by its server ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the cancel call fails.
    pub async fn delete(&self, server_id: &str) -> Result<()> {
        info!("Cancelling server {server_id}");
        self.api.cancel_server(server_id).await?;
        info!("Server {server_id} cancelled");
        Ok(())
    }

    /// Looks up an existing server by its service ID string.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidImportId`] if the ID is not numeric,
    /// or the errors of [`Self::read`].
    pub async fn import(&self, service_id: &str) -> Result<Server> {
        let parsed = service_id
            .trim()
            .parse()
            .map_err(|_| ResourceError::InvalidImportId {
                value: service_id.to_string(),
            })?;
        self.read(parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IcsError, ResolveError};
    use crate::ics::fake::FakeIcs;
    use crate::ics::{MockIcsApi, SshKey};

    fn spec() -> ServerSpec {
        ServerSpec {
            name: String::from("web-1"),
            instance_type: String::from("c1.small"),
            location: String::from("NYC1"),
            operating_system: String::from("Ubuntu 24.04"),
            hostname: Some(String::from("web-1.example.com")),
            friendly_name: Some(String::from("web one")),
            ssh_key_labels: vec![String::from("ops")],
        }
    }

    fn stocked_fake() -> FakeIcs {
        let api = FakeIcs::stocked();
        api.ssh_keys.lock().expect("keys").push(SshKey {
            id: 7,
            label: String::from("ops"),
            ..SshKey::default()
        });
        api
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_orders_waits_and_names() {
        let api = stocked_fake();

        let created = ServerController::new(&api, PollPolicy::default())
            .create(&spec(), &mut CancelSignal::never())
            .await
            .expect("created");

        assert!(created.warnings.is_empty());
        assert_eq!(created.server.friendly_name, "web one");
        assert_eq!(created.server.hostname, "web-1.example.com");

        let orders = api.orders.lock().expect("orders");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].ssh_key_ids, vec![7]);
        assert_eq!(orders[0].operating_system_product_code, "UBUNTU_24_04");
        assert_eq!(api.count("update_friendly_name"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_failure_is_a_warning() {
        let api = stocked_fake();
        *api.fail_friendly_name.lock().expect("flag") = true;

        let created = ServerController::new(&api, PollPolicy::default())
            .create(&spec(), &mut CancelSignal::never())
            .await
            .expect("created");

        assert_eq!(created.warnings.len(), 1);
        assert!(created.warnings[0].contains("provisioned successfully"));
        assert!(created.server.friendly_name.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_os_orders_nothing() {
        let api = stocked_fake();
        let mut bad = spec();
        bad.operating_system = String::from("Windows 3.1");

        let err = ServerController::new(&api, PollPolicy::default())
            .create(&bad, &mut CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IcsError::Resolve(ResolveError::OperatingSystemNotFound { .. })
        ));
        assert_eq!(api.count("order_server"), 0);
    }

    #[tokio::test]
    async fn test_friendly_name_only_updates_in_place() {
        let mut api = MockIcsApi::new();
        api.expect_update_friendly_name()
            .withf(|id, name| id == "srv-1" && name == "web uno")
            .times(1)
            .returning(|_, _| Ok(()));

        let current = spec();
        let mut desired = spec();
        desired.friendly_name = Some(String::from("web uno"));

        let outcome = ServerController::new(&api, PollPolicy::default())
            .update("srv-1", &current, &desired)
            .await
            .expect("update");
        assert_eq!(
            outcome,
            UpdateOutcome::InPlace {
                fields: vec!["friendly_name"]
            }
        );
    }

    #[tokio::test]
    async fn test_instance_type_change_requires_replacement() {
        let mut api = MockIcsApi::new();
        api.expect_update_friendly_name().never();

        let current = spec();
        let mut desired = spec();
        desired.instance_type = String::from("c2.medium");
        desired.friendly_name = Some(String::from("web uno"));

        let outcome = ServerController::new(&api, PollPolicy::default())
            .update("srv-1", &current, &desired)
            .await
            .expect("update");
        assert!(outcome.requires_replacement());
        assert_eq!(
            outcome,
            UpdateOutcome::RequiresReplacement {
                fields: vec!["instance_type"]
            }
        );
    }

    #[tokio::test]
    async fn test_identical_definition_is_no_change() {
        let api = MockIcsApi::new();
        let outcome = ServerController::new(&api, PollPolicy::default())
            .update("srv-1", &spec(), &spec())
            .await
            .expect("update");
        assert_eq!(outcome, UpdateOutcome::NoChange);
    }

    #[tokio::test]
    async fn test_read_absent_is_error() {
        let mut api = MockIcsApi::new();
        api.expect_list_servers().returning(|| Ok(vec![]));

        let err = ServerController::new(&api, PollPolicy::default())
            .read(500)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IcsError::Resource(ResourceError::ServerNotFound { service_id: 500 })
        ));
    }

    #[tokio::test]
    async fn test_import_by_service_id() {
        let mut api = MockIcsApi::new();
        api.expect_list_servers().returning(|| {
            Ok(vec![Server {
                id: String::from("srv-9"),
                service_id: 500,
                ..Server::default()
            }])
        });
        let controller = ServerController::new(&api, PollPolicy::default());

        let server = controller.import("500").await.expect("imported");
        assert_eq!(server.id, "srv-9");

        let err = controller.import("web-1").await.unwrap_err();
        assert!(matches!(
            err,
            IcsError::Resource(ResourceError::InvalidImportId { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_cancels_by_server_id() {
        let mut api = MockIcsApi::new();
        api.expect_cancel_server()
            .withf(|id| id == "srv-9")
            .times(1)
            .returning(|_| Ok(()));

        ServerController::new(&api, PollPolicy::default())
            .delete("srv-9")
            .await
            .expect("deleted");
    }
}
