//! The API seam every provisioning component talks through.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

use super::types::{
    AddonCatalog, CreateSshKeyRequest, CreatedSshKey, InventoryItem, OrderRequest, OrderResponse,
    Server, SshKey,
};

/// Operations consumed from the ICS REST API.
///
/// [`super::IcsClient`] is the production implementation; tests substitute
/// mocks or scripted fakes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IcsApi: Send + Sync {
    /// Lists the full inventory snapshot.
    async fn list_inventory(&self) -> Result<Vec<InventoryItem>>;

    /// Lists installable add-ons for a SKU at a location.
    async fn list_addons(&self, sku_product_name: &str, location_code: &str)
    -> Result<AddonCatalog>;

    /// Submits a server order.
    async fn order_server(&self, request: &OrderRequest) -> Result<OrderResponse>;

    /// Lists every server on the account.
    async fn list_servers(&self) -> Result<Vec<Server>>;

    /// Cancels an hourly-billed server.
    async fn cancel_server(&self, server_id: &str) -> Result<()>;

    /// Sets a server's display name.
    async fn update_friendly_name(&self, server_id: &str, friendly_name: &str) -> Result<()>;

    /// Registers an SSH key.
    async fn create_ssh_key(&self, request: &CreateSshKeyRequest) -> Result<CreatedSshKey>;

    /// Lists every SSH key on the account.
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    /// Deletes an SSH key.
    async fn delete_ssh_key(&self, key_id: u64) -> Result<()>;
}
