//! ICS REST API integration module.
//!
//! This module provides the transport client, the wire types, and the
//! [`IcsApi`] trait that every provisioning component is written against.

mod api;
mod client;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use api::IcsApi;
#[cfg(test)]
pub use api::MockIcsApi;
pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, IcsClient};
pub use types::{
    AddonCatalog, AddonCategory, AssignedServer, CreateSshKeyRequest, CreatedSshKey, Envelope,
    FriendlyNameRequest, InventoryItem, InventoryMetadata, LicenseItem, OperatingSystemItem,
    OrderRequest, OrderResponse, Server, SshKey, SupportItem,
};
