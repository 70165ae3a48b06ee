//! Provisioning engine.
//!
//! The path from a declarative server definition to a running machine:
//! resolve the catalog entries, submit the order, then wait for the server
//! to appear. Each step takes an explicit [`crate::ics::IcsApi`] handle.

mod catalog;
mod order;
mod poller;

pub use catalog::{AvailabilityReport, CatalogResolver};
pub use order::OrderOrchestrator;
pub use poller::{
    CancelHandle, CancelSignal, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PROVISION_TIMEOUT_SECS,
    PollOutcome, PollPolicy, PollStats, ProvisioningPoller, cancel_pair, poll_until,
    relay_interrupts,
};
