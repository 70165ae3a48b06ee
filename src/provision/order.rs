//! Order submission.
//!
//! SSH key labels are resolved before anything is sent, so a typo never
//! leaves a half-configured order behind. Orders are submitted exactly
//! once; a timed-out submission is reported as possibly accepted rather than
//! retried.

use tracing::{debug, info};

use crate::error::{ApiError, IcsError, OrderError, ResolveError, Result};
use crate::ics::{IcsApi, InventoryItem, OperatingSystemItem, OrderRequest};

/// Builds and submits server orders.
pub struct OrderOrchestrator<'a> {
    api: &'a dyn IcsApi,
}

impl<'a> OrderOrchestrator<'a> {
    /// Creates an orchestrator over an API handle.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi) -> Self {
        Self { api }
    }

    /// Resolves SSH key labels to numeric identifiers by exact label match.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::SshKeyNotFound`] for the first missing label.
    pub async fn resolve_ssh_key_ids(&self, labels: &[String]) -> Result<Vec<u64>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let keys = self.api.list_ssh_keys().await?;
        labels
            .iter()
            .map(|label| {
                keys.iter()
                    .find(|k| k.label == *label)
                    .map(|k| k.id)
                    .ok_or_else(|| {
                        IcsError::from(ResolveError::SshKeyNotFound {
                            label: label.clone(),
                        })
                    })
            })
            .collect()
    }

    /// Submits a single-server, hourly-billed order and returns its service ID.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if an SSH key label is unknown (nothing is
    /// submitted), [`OrderError::MaybeSubmitted`] if the submission timed
    /// out, [`OrderError::Unconfirmed`] if the connection dropped or a 2xx
    /// response could not be read, [`OrderError::Rejected`] when the API
    /// refused the order, or
    /// [`OrderError::EmptyServiceIds`] if the response carried no IDs.
    pub async fn submit(
        &self,
        sku: &InventoryItem,
        operating_system: &OperatingSystemItem,
        hostname: Option<&str>,
        ssh_key_labels: &[String],
    ) -> Result<u64> {
        let ssh_key_ids = self.resolve_ssh_key_ids(ssh_key_labels).await?;

        let request = OrderRequest::new(
            &sku.sku_product_name,
            &sku.location_code,
            &operating_system.product_code,
        )
        .with_hostname(hostname)
        .with_ssh_key_ids(ssh_key_ids);

        info!(
            "Ordering {} in {} with {}",
            request.sku_product_name, request.location_code, operating_system.name
        );
        debug!("Order request: {request:?}");

        let response = match self.api.order_server(&request).await {
            Ok(response) => response,
            Err(IcsError::Api(source @ ApiError::Timeout { .. })) => {
                return Err(OrderError::MaybeSubmitted { source }.into());
            }
            Err(IcsError::Api(
                source @ (ApiError::NetworkError { .. }
                | ApiError::InvalidResponse { .. }
                | ApiError::Envelope { .. }),
            )) => {
                return Err(OrderError::Unconfirmed { source }.into());
            }
            Err(IcsError::Api(source)) => return Err(OrderError::Rejected { source }.into()),
            Err(e) => return Err(e),
        };

        let service_id = response
            .order_service_ids
            .first()
            .copied()
            .ok_or(OrderError::EmptyServiceIds)?;

        if response.order_service_ids.len() > 1 {
            debug!(
                "Order returned {} service IDs, using the first",
                response.order_service_ids.len()
            );
        }

        info!("Order placed, service ID: {service_id}");
        Ok(service_id)
    }
}
