//! ICS API types and data structures.
//!
//! This module defines the types exchanged with the ICS REST API. Response
//! types are lenient (`#[serde(default)]`) because the backend omits fields
//! it has no value for.

use serde::{Deserialize, Deserializer, Serialize};

/// Uniform response envelope wrapping every API payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Status code reported inside the body.
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Payload.
    pub data: Option<T>,
}

/// A SKU offering at a specific location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    /// SKU identifier.
    pub sku_id: u64,
    /// Total quantity in stock.
    pub quantity: u32,
    /// Units available for unattended provisioning.
    pub auto_provision_quantity: u32,
    /// Datacenter identifier.
    pub datacenter_id: u64,
    /// Region identifier.
    pub region_id: u64,
    /// Location code (e.g. `NYC1`).
    pub location_code: String,
    /// CPU brand.
    pub cpu_brand: String,
    /// CPU model.
    pub cpu_model: String,
    /// CPU clock speed in GHz.
    pub cpu_clock_speed_ghz: f64,
    /// Cores per CPU.
    pub cpu_cores: u32,
    /// Number of CPUs.
    pub cpu_count: u32,
    /// Total SSD capacity in GB.
    pub total_ssd_size_gb: u32,
    /// Total HDD capacity in GB.
    pub total_hdd_size_gb: u32,
    /// Total NVMe capacity in GB.
    pub total_nvme_size_gb: u32,
    /// Whether RAID is configured.
    pub raid_enabled: bool,
    /// Total RAM in GB.
    pub total_ram_gb: u32,
    /// NIC speed in Mbps.
    pub nic_speed_mbps: u32,
    /// Billing product identifier.
    pub qt_product_id: u64,
    /// Inventory status.
    pub status: String,
    /// Free-form metadata entries.
    pub metadata: Vec<InventoryMetadata>,
    /// Currency of the price fields.
    pub currency_code: String,
    /// Human-friendly instance type (e.g. `c1.small`).
    pub sku_product_name: String,
    /// Monthly price.
    pub price: String,
    /// Hourly price.
    pub price_hourly: String,
    /// Whether hourly billing is offered.
    pub hourly_enabled: bool,
}

/// Metadata attached to an inventory item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryMetadata {
    /// Metadata key.
    pub name: String,
    /// Description of the key.
    pub description: String,
    /// Metadata value.
    pub value: String,
}

/// Installable add-ons for a (SKU, location) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonCatalog {
    /// Operating system options.
    pub operating_systems: AddonCategory<OperatingSystemItem>,
    /// License options.
    pub licenses: AddonCategory<LicenseItem>,
    /// Support level options.
    pub support_levels: AddonCategory<SupportItem>,
}

/// A named group of add-on products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonCategory<T> {
    /// Category name.
    pub name: String,
    /// Whether a choice is required (only sent for operating systems).
    pub required: Option<String>,
    /// Products in this category.
    pub products: Vec<T>,
}

impl<T> Default for AddonCategory<T> {
    fn default() -> Self {
        Self {
            name: String::new(),
            required: None,
            products: Vec::new(),
        }
    }
}

/// A single operating system option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingSystemItem {
    /// Display name, matched exactly during resolution.
    pub name: String,
    /// Operating system family.
    pub os_type: String,
    /// Product code sent in the order.
    pub product_code: String,
    /// Monthly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price: f64,
    /// Per-core price, for licensed systems.
    pub price_per_core: Option<f64>,
    /// Hourly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price_hourly: f64,
    /// Whether hourly billing is offered.
    pub hourly_enabled: bool,
}

/// A single license option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseItem {
    /// Display name.
    pub name: String,
    /// Product code.
    pub product_code: String,
    /// Monthly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price: f64,
    /// Hourly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price_hourly: f64,
    /// Whether hourly billing is offered.
    pub hourly_enabled: bool,
}

/// A single support level option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportItem {
    /// Display name.
    pub name: String,
    /// Description of the support level.
    pub description: String,
    /// Product code.
    pub product_code: String,
    /// Monthly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price: f64,
    /// Hourly price.
    #[serde(deserialize_with = "null_as_zero")]
    pub price_hourly: f64,
    /// Whether hourly billing is offered.
    pub hourly_enabled: bool,
}

/// A provisioned bare-metal server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    /// Opaque server identifier.
    pub id: String,
    /// Hostname.
    pub hostname: String,
    /// Primary MAC address.
    pub mac_address: String,
    /// Public IPv4 address.
    pub public_ip: String,
    /// Service identifier linking the server to its order.
    pub service_id: u64,
    /// Service description.
    pub service_description: String,
    /// Billing plan identifier.
    pub plan_id: u64,
    /// Datacenter name.
    pub datacenter_name: String,
    /// Datacenter identifier.
    pub datacenter_id: u64,
    /// Location identifier.
    pub location_id: u64,
    /// Display name set by the user.
    pub friendly_name: String,
    /// Hardware vendor.
    pub vendor: String,
    /// Server type.
    pub server_type: String,
    /// Whether the server is billed hourly.
    pub bill_hourly: bool,
    /// Generated root password.
    pub root_password: String,
}

/// Request body for ordering servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    /// Instance type.
    pub sku_product_name: String,
    /// Number of servers.
    pub quantity: u32,
    /// Location code.
    pub location_code: String,
    /// Operating system product code.
    pub operating_system_product_code: String,
    /// Hostname for the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Bill hourly instead of monthly.
    pub bill_hourly: bool,
    /// SSH keys to install.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_key_ids: Vec<u64>,
}

/// Response payload of a server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrderResponse {
    /// Service identifiers, one per ordered server.
    pub order_service_ids: Vec<u64>,
}

/// An SSH key registered on the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshKey {
    /// Numeric identifier.
    pub id: u64,
    /// Unique label.
    pub label: String,
    /// Public key material.
    pub key: String,
    /// Creation time (unix seconds).
    pub created_at: i64,
    /// Last update time (unix seconds).
    pub updated_at: i64,
    /// Servers the key is installed on.
    pub assigned_servers: Vec<AssignedServer>,
}

/// A server an SSH key is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignedServer {
    /// Server identifier.
    pub server_id: String,
    /// Service identifier.
    pub service_id: u64,
    /// Hostname.
    pub hostname: String,
    /// Datacenter name.
    pub datacenter_name: String,
}

/// Request body for creating an SSH key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSshKeyRequest {
    /// Public key material.
    pub public_key: String,
    /// Unique label.
    pub label: String,
}

/// Response payload of SSH key creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreatedSshKey {
    /// Identifier of the new key.
    pub id: u64,
}

/// Request body for renaming a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendlyNameRequest {
    /// New display name.
    pub friendly_name: String,
}

impl InventoryItem {
    /// Returns true if the item can be ordered right now.
    #[must_use]
    pub const fn is_orderable(&self) -> bool {
        self.auto_provision_quantity > 0
    }
}

impl OrderRequest {
    /// Creates a single-server, hourly-billed order.
    #[must_use]
    pub fn new(sku_product_name: &str, location_code: &str, os_product_code: &str) -> Self {
        Self {
            sku_product_name: sku_product_name.to_string(),
            quantity: 1,
            location_code: location_code.to_string(),
            operating_system_product_code: os_product_code.to_string(),
            hostname: None,
            bill_hourly: true,
            ssh_key_ids: Vec::new(),
        }
    }

    /// Sets the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: Option<&str>) -> Self {
        self.hostname = hostname.map(String::from);
        self
    }

    /// Sets the SSH key identifiers.
    #[must_use]
    pub fn with_ssh_key_ids(mut self, ids: Vec<u64>) -> Self {
        self.ssh_key_ids = ids;
        self
    }
}

/// Reads a price the backend may send as `null` for free products.
fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}
