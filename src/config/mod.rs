//! Configuration module for the ICS provisioning system.
//!
//! This module handles all configuration-related functionality:
//! - Provider settings (API token, endpoint, timing) from flags and environment
//! - Parsing and deserializing `ics.resources.yaml`
//! - Validation of the manifest before anything is ordered

mod spec;
mod parser;
mod settings;
mod validator;

pub use spec::{Manifest, SERVER_REPLACEMENT_FIELDS, ServerSpec, SshKeySpec};
pub use parser::{DEFAULT_MANIFEST_FILES, ManifestParser, find_manifest_file};
pub use settings::{
    ENV_API_TOKEN, ENV_BASE_URL, ENV_POLL_INTERVAL, ENV_PROVISION_TIMEOUT, ENV_REQUEST_TIMEOUT,
    ProviderSettings,
};
pub use validator::{ManifestValidator, ValidationError, ValidationResult};
