//! In-memory [`IcsApi`] for tests that need more than one scripted response.
//!
//! Orders appear in the server list immediately unless a server-list script
//! is queued, in which case scripted responses are served first.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{ApiError, Result};

use super::api::IcsApi;
use super::types::{
    AddonCatalog, AddonCategory, CreateSshKeyRequest, CreatedSshKey, InventoryItem,
    OperatingSystemItem, OrderRequest, OrderResponse, Server, SshKey,
};

/// One scripted `list_servers` response.
#[derive(Debug, Clone)]
pub enum ServerListStep {
    /// Return these servers.
    Servers(Vec<Server>),
    /// Fail with a network error.
    NetworkError,
}

/// Scripted in-memory API.
#[derive(Debug, Default)]
pub struct FakeIcs {
    /// Inventory returned by `list_inventory`.
    pub inventory: Mutex<Vec<InventoryItem>>,
    /// Catalog returned by `list_addons`.
    pub addons: Mutex<AddonCatalog>,
    /// Live servers.
    pub servers: Mutex<Vec<Server>>,
    /// Live SSH keys.
    pub ssh_keys: Mutex<Vec<SshKey>>,
    /// Queued `list_servers` responses served before `servers`.
    pub server_script: Mutex<VecDeque<ServerListStep>>,
    /// Every order submitted.
    pub orders: Mutex<Vec<OrderRequest>>,
    /// Names of every call made, in order.
    pub calls: Mutex<Vec<String>>,
    /// Fail friendly-name updates.
    pub fail_friendly_name: Mutex<bool>,
    /// Accept key creation without making the key visible.
    pub drop_created_keys: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl FakeIcs {
    /// Creates an empty fake.
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(500),
            ..Self::default()
        }
    }

    /// Creates a fake that sells `c1.small` in `NYC1` with Ubuntu 24.04.
    pub fn stocked() -> Self {
        let api = Self::new();
        api.inventory.lock().expect("inventory lock").push(InventoryItem {
            sku_product_name: String::from("c1.small"),
            location_code: String::from("NYC1"),
            auto_provision_quantity: 3,
            ..InventoryItem::default()
        });
        *api.addons.lock().expect("addons lock") = AddonCatalog {
            operating_systems: AddonCategory {
                name: String::from("Operating Systems"),
                required: None,
                products: vec![OperatingSystemItem {
                    name: String::from("Ubuntu 24.04"),
                    product_code: String::from("UBUNTU_24_04"),
                    ..OperatingSystemItem::default()
                }],
            },
            ..AddonCatalog::default()
        };
        api
    }

    /// Counts calls with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().expect("calls lock").push(name.to_string());
    }

    fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.lock().expect("id lock");
        let id = *next;
        *next += 1;
        id
    }
}

#[async_trait]
impl IcsApi for FakeIcs {
    async fn list_inventory(&self) -> Result<Vec<InventoryItem>> {
        self.record("list_inventory");
        Ok(self.inventory.lock().expect("inventory lock").clone())
    }

    async fn list_addons(&self, _sku: &str, _location: &str) -> Result<AddonCatalog> {
        self.record("list_addons");
        Ok(self.addons.lock().expect("addons lock").clone())
    }

    async fn order_server(&self, request: &OrderRequest) -> Result<OrderResponse> {
        self.record("order_server");
        self.orders.lock().expect("orders lock").push(request.clone());

        let service_id = self.allocate_id();
        self.servers.lock().expect("servers lock").push(Server {
            id: format!("srv-{service_id}"),
            hostname: request.hostname.clone().unwrap_or_default(),
            service_id,
            server_type: request.sku_product_name.clone(),
            bill_hourly: request.bill_hourly,
            public_ip: String::from("192.0.2.10"),
            root_password: String::from("hunter2"),
            ..Server::default()
        });

        Ok(OrderResponse {
            order_service_ids: vec![service_id],
        })
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.record("list_servers");
        let step = self.server_script.lock().expect("script lock").pop_front();
        match step {
            Some(ServerListStep::Servers(servers)) => Ok(servers),
            Some(ServerListStep::NetworkError) => Err(ApiError::network("connection reset").into()),
            None => Ok(self.servers.lock().expect("servers lock").clone()),
        }
    }

    async fn cancel_server(&self, server_id: &str) -> Result<()> {
        self.record("cancel_server");
        self.servers
            .lock()
            .expect("servers lock")
            .retain(|s| s.id != server_id);
        Ok(())
    }

    async fn update_friendly_name(&self, server_id: &str, friendly_name: &str) -> Result<()> {
        self.record("update_friendly_name");
        if *self.fail_friendly_name.lock().expect("flag lock") {
            return Err(ApiError::request_failed(500, "rename unavailable").into());
        }
        if let Some(server) = self
            .servers
            .lock()
            .expect("servers lock")
            .iter_mut()
            .find(|s| s.id == server_id)
        {
            server.friendly_name = friendly_name.to_string();
        }
        Ok(())
    }

    async fn create_ssh_key(&self, request: &CreateSshKeyRequest) -> Result<CreatedSshKey> {
        self.record("create_ssh_key");
        let id = self.allocate_id();
        if !*self.drop_created_keys.lock().expect("flag lock") {
            self.ssh_keys.lock().expect("keys lock").push(SshKey {
                id,
                label: request.label.clone(),
                key: request.public_key.clone(),
                created_at: 1_700_000_000,
                updated_at: 1_700_000_000,
                assigned_servers: Vec::new(),
            });
        }
        Ok(CreatedSshKey { id })
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        self.record("list_ssh_keys");
        Ok(self.ssh_keys.lock().expect("keys lock").clone())
    }

    async fn delete_ssh_key(&self, key_id: u64) -> Result<()> {
        self.record("delete_ssh_key");
        self.ssh_keys
            .lock()
            .expect("keys lock")
            .retain(|k| k.id != key_id);
        Ok(())
    }
}
