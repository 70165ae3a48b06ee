//! Catalog resolution.
//!
//! Turns a human-facing instance type and location into an orderable SKU,
//! and an operating system name into its product code. Every lookup fetches
//! a fresh snapshot; nothing is cached between calls.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::{ResolveError, Result};
use crate::ics::{AddonCatalog, IcsApi, InventoryItem, OperatingSystemItem};

/// Alternatives offered when a type/location combination cannot be ordered.
///
/// Only entries with auto-provisionable capacity are listed, and every list
/// is derived from the same inventory snapshot the lookup ran against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityReport {
    /// Requested instance type.
    pub instance_type: String,
    /// Requested location.
    pub location: String,
    /// Locations where the requested type can be ordered.
    pub available_locations: Vec<String>,
    /// Types that can be ordered at the requested location.
    pub available_types: Vec<String>,
    /// Every orderable type with its locations.
    pub combinations: BTreeMap<String, Vec<String>>,
}

impl AvailabilityReport {
    /// Builds the report from an inventory snapshot.
    #[must_use]
    pub fn from_inventory(items: &[InventoryItem], instance_type: &str, location: &str) -> Self {
        let mut report = Self {
            instance_type: instance_type.to_string(),
            location: location.to_string(),
            ..Self::default()
        };

        for item in items.iter().filter(|i| i.is_orderable()) {
            if item.sku_product_name == instance_type {
                push_unique(&mut report.available_locations, &item.location_code);
            }
            if !location.is_empty() && item.location_code == location {
                push_unique(&mut report.available_types, &item.sku_product_name);
            }
            push_unique(
                report
                    .combinations
                    .entry(item.sku_product_name.clone())
                    .or_default(),
                &item.location_code,
            );
        }

        report
    }

    /// Returns true if nothing at all can be ordered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

impl fmt::Display for AvailabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.available_types.is_empty() {
            write!(
                f,
                "\n\nAvailable instance types in location '{}': {}",
                self.location,
                self.available_types.join(", ")
            )?;
        }

        if !self.available_locations.is_empty() {
            write!(
                f,
                "\n\nAvailable locations for instance type '{}': {}",
                self.instance_type,
                self.available_locations.join(", ")
            )?;
        }

        if !self.combinations.is_empty() {
            write!(f, "\n\nAll available combinations with inventory:")?;
            for (instance_type, locations) in &self.combinations {
                write!(f, "\n  {instance_type}: {}", locations.join(", "))?;
            }
        }

        Ok(())
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Resolves instance types and operating systems against live catalog data.
pub struct CatalogResolver<'a> {
    api: &'a dyn IcsApi,
}

impl<'a> CatalogResolver<'a> {
    /// Creates a resolver over an API handle.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi) -> Self {
        Self { api }
    }

    /// Resolves an instance type (and optional location) to an orderable SKU.
    ///
    /// Returns the first item in backend order whose product name matches,
    /// whose location matches when `location` is non-empty, and which has
    /// auto-provisionable capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownInstanceType`] if the type appears
    /// nowhere in the inventory, [`ResolveError::NoCapacity`] if it exists
    /// but not orderable at the location, or a transport error.
    pub async fn resolve(&self, instance_type: &str, location: &str) -> Result<InventoryItem> {
        info!("Resolving instance type '{instance_type}' in location '{location}'");

        let inventory = self.api.list_inventory().await?;
        debug!("Inventory snapshot has {} items", inventory.len());

        let found = inventory.iter().find(|item| {
            item.sku_product_name == instance_type
                && (location.is_empty() || item.location_code == location)
                && item.is_orderable()
        });

        if let Some(item) = found {
            debug!(
                "Resolved {instance_type} to SKU {} ({} auto-provisionable)",
                item.sku_id, item.auto_provision_quantity
            );
            return Ok(item.clone());
        }

        let report = AvailabilityReport::from_inventory(&inventory, instance_type, location);
        let known = inventory
            .iter()
            .any(|item| item.sku_product_name == instance_type);

        if known {
            Err(ResolveError::NoCapacity {
                instance_type: instance_type.to_string(),
                location: location.to_string(),
                report,
            }
            .into())
        } else {
            Err(ResolveError::UnknownInstanceType {
                instance_type: instance_type.to_string(),
                report,
            }
            .into())
        }
    }

    /// Resolves an operating system by exact, case-sensitive name.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::OperatingSystemNotFound`] listing every
    /// available name, or a transport error.
    pub async fn resolve_operating_system(
        &self,
        sku_product_name: &str,
        location: &str,
        os_name: &str,
    ) -> Result<OperatingSystemItem> {
        info!("Validating operating system '{os_name}' for {sku_product_name} in {location}");

        let catalog = self.api.list_addons(sku_product_name, location).await?;

        if let Some(os) = catalog
            .operating_systems
            .products
            .iter()
            .find(|os| os.name == os_name)
        {
            debug!("Resolved operating system to product code {}", os.product_code);
            return Ok(os.clone());
        }

        Err(ResolveError::OperatingSystemNotFound {
            operating_system: os_name.to_string(),
            instance_type: sku_product_name.to_string(),
            location: location.to_string(),
            available: operating_system_names(&catalog),
        }
        .into())
    }

    /// Lists inventory items, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be fetched.
    pub async fn inventory(
        &self,
        location: Option<&str>,
        instance_type: Option<&str>,
        orderable_only: bool,
    ) -> Result<Vec<InventoryItem>> {
        let inventory = self.api.list_inventory().await?;
        Ok(inventory
            .into_iter()
            .filter(|i| location.is_none_or(|l| i.location_code == l))
            .filter(|i| instance_type.is_none_or(|t| i.sku_product_name == t))
            .filter(|i| !orderable_only || i.is_orderable())
            .collect())
    }

    /// Lists installable operating systems for a type at a location.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be fetched.
    pub async fn operating_systems(
        &self,
        sku_product_name: &str,
        location: &str,
    ) -> Result<Vec<OperatingSystemItem>> {
        let catalog = self.api.list_addons(sku_product_name, location).await?;
        Ok(catalog.operating_systems.products)
    }
}

fn operating_system_names(catalog: &AddonCatalog) -> Vec<String> {
    catalog
        .operating_systems
        .products
        .iter()
        .map(|os| os.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IcsError;
    use crate::ics::{AddonCategory, MockIcsApi};

    fn item(name: &str, location: &str, qty: u32) -> InventoryItem {
        InventoryItem {
            sku_product_name: name.to_string(),
            location_code: location.to_string(),
            auto_provision_quantity: qty,
            quantity: qty,
            ..InventoryItem::default()
        }
    }

    fn os(name: &str, code: &str) -> OperatingSystemItem {
        OperatingSystemItem {
            name: name.to_string(),
            product_code: code.to_string(),
            ..OperatingSystemItem::default()
        }
    }

    fn api_with_inventory(items: Vec<InventoryItem>) -> MockIcsApi {
        let mut api = MockIcsApi::new();
        api.expect_list_inventory()
            .times(1)
            .returning(move || Ok(items.clone()));
        api
    }

    #[tokio::test]
    async fn test_no_capacity_lists_other_locations() {
        let api = api_with_inventory(vec![item("c1.small", "NYC1", 3), item("c1.small", "ORD1", 0)]);
        let resolver = CatalogResolver::new(&api);

        let err = resolver.resolve("c1.small", "ORD1").await.unwrap_err();
        match err {
            IcsError::Resolve(ResolveError::NoCapacity { report, .. }) => {
                assert_eq!(report.available_locations, vec!["NYC1"]);
                assert!(report.available_types.is_empty());
                assert_eq!(report.combinations["c1.small"], vec!["NYC1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_resolves_first_orderable_match() {
        let mut first = item("c1.small", "NYC1", 2);
        first.sku_id = 11;
        let mut second = item("c1.small", "NYC1", 5);
        second.sku_id = 12;
        let api = api_with_inventory(vec![item("c1.small", "NYC1", 0), first, second]);

        let resolved = CatalogResolver::new(&api)
            .resolve("c1.small", "NYC1")
            .await
            .expect("resolved");
        assert_eq!(resolved.sku_id, 11);
    }

    #[tokio::test]
    async fn test_empty_location_matches_any() {
        let api = api_with_inventory(vec![item("c1.small", "ORD1", 1)]);

        let resolved = CatalogResolver::new(&api)
            .resolve("c1.small", "")
            .await
            .expect("resolved");
        assert_eq!(resolved.location_code, "ORD1");
    }

    #[tokio::test]
    async fn test_unknown_type_reports_types_at_location() {
        let api = api_with_inventory(vec![
            item("c1.small", "NYC1", 3),
            item("c2.large", "NYC1", 1),
            item("c2.large", "AMS1", 0),
        ]);

        let err = CatalogResolver::new(&api)
            .resolve("c9.huge", "NYC1")
            .await
            .unwrap_err();
        match err {
            IcsError::Resolve(ResolveError::UnknownInstanceType { report, .. }) => {
                assert!(report.available_locations.is_empty());
                assert_eq!(report.available_types, vec!["c1.small", "c2.large"]);
                assert_eq!(report.combinations["c2.large"], vec!["NYC1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_report_lists_only_snapshot_pairs() {
        let inventory = vec![
            item("c1.small", "NYC1", 3),
            item("c1.small", "NYC1", 1),
            item("c1.small", "ORD1", 0),
            item("c2.large", "AMS1", 2),
        ];
        let report = AvailabilityReport::from_inventory(&inventory, "c1.small", "ORD1");

        for (instance_type, locations) in &report.combinations {
            for location in locations {
                assert!(inventory.iter().any(|i| i.sku_product_name == *instance_type
                    && i.location_code == *location
                    && i.is_orderable()));
            }
        }
        assert_eq!(report.available_locations, vec!["NYC1"]);

        let rendered = report.to_string();
        assert!(rendered.contains("Available locations for instance type 'c1.small': NYC1"));
        assert!(rendered.contains("c2.large: AMS1"));
    }

    #[tokio::test]
    async fn test_operating_system_exact_match() {
        let mut api = MockIcsApi::new();
        api.expect_list_addons()
            .withf(|sku, location| sku == "c1.small" && location == "NYC1")
            .times(2)
            .returning(|_, _| {
                Ok(AddonCatalog {
                    operating_systems: AddonCategory {
                        name: String::from("Operating Systems"),
                        required: None,
                        products: vec![os("Ubuntu 24.04", "UBUNTU_24_04"), os("Debian 12", "DEBIAN_12")],
                    },
                    ..AddonCatalog::default()
                })
            });
        let resolver = CatalogResolver::new(&api);

        let found = resolver
            .resolve_operating_system("c1.small", "NYC1", "Debian 12")
            .await
            .expect("os");
        assert_eq!(found.product_code, "DEBIAN_12");

        let err = resolver
            .resolve_operating_system("c1.small", "NYC1", "ubuntu 24.04")
            .await
            .unwrap_err();
        match err {
            IcsError::Resolve(ResolveError::OperatingSystemNotFound { available, .. }) => {
                assert_eq!(available, vec!["Ubuntu 24.04", "Debian 12"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inventory_filters() {
        let mut api = MockIcsApi::new();
        api.expect_list_inventory().returning(|| {
            Ok(vec![
                item("c1.small", "NYC1", 3),
                item("c1.small", "ORD1", 0),
                item("c2.large", "NYC1", 1),
            ])
        });
        let resolver = CatalogResolver::new(&api);

        let nyc = resolver.inventory(Some("NYC1"), None, false).await.expect("inventory");
        assert_eq!(nyc.len(), 2);

        let orderable = resolver
            .inventory(None, Some("c1.small"), true)
            .await
            .expect("inventory");
        assert_eq!(orderable.len(), 1);
        assert_eq!(orderable[0].location_code, "NYC1");
    }
}
