// ============================================================================
// Linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![warn(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # ics
//!
//! Declarative provisioning of bare-metal servers on Ingenuity Cloud Services.
//!
//! ## Overview
//!
//! A server on ICS is ordered, not created: the order names a SKU from the
//! hardware catalog, an operating system product, and optional add-ons, and
//! the machine appears in the account minutes later. This crate hides that
//! workflow behind a manifest of desired servers and SSH keys:
//!
//! - Resolve an instance type and location to an orderable catalog entry
//! - Submit the order and wait for the server to show up
//! - Track what was created so later runs update, replace, or delete it
//!
//! ## Architecture
//!
//! 1. **Manifest**: `ics.resources.yaml`, parsed and validated by [`config`]
//! 2. **State**: what this project created, kept by [`state`]
//! 3. **Plan**: the ordered actions that close the gap, built by [`planner`]
//! 4. **Controllers**: per-resource lifecycle in [`resources`], driving the
//!    order workflow in [`provision`] through the [`ics`] API client
//!
//! ## Modules
//!
//! - [`config`]: Manifest parsing, validation, and provider settings
//! - [`ics`]: REST client, wire types, and the [`ics::IcsApi`] trait
//! - [`provision`]: Catalog resolution, ordering, and provisioning polls
//! - [`resources`]: Server and SSH key lifecycle controllers
//! - [`state`]: State storage and locking
//! - [`planner`]: Diff computation, plans, execution, and refresh
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! ssh_keys:
//!   - label: deploy
//!     public_key: "ssh-ed25519 AAAA... deploy@example"
//!
//! servers:
//!   - name: web-1
//!     instance_type: c1.small
//!     location: NYC1
//!     operating_system: Ubuntu 24.04
//!     friendly_name: Web 1
//!     ssh_key_labels:
//!       - deploy
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod ics;
pub mod planner;
pub mod provision;
pub mod resources;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Manifest, ManifestParser, ManifestValidator, ProviderSettings};
pub use error::{IcsError, Result};
pub use ics::{IcsApi, IcsClient};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor, Refresher};
pub use provision::{CatalogResolver, OrderOrchestrator, ProvisioningPoller};
pub use resources::{ServerController, SshKeyController};
pub use state::{DeploymentState, LocalStateStore, StateStore};
