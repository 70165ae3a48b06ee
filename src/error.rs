//! Error types for the ICS provisioning system.
//!
//! Errors are grouped by the layer that produces them: configuration,
//! transport, catalog resolution, ordering, provisioning, resource
//! lifecycle, state and planning. The grouping mirrors how a failure should
//! be reported: a resolution failure carries alternatives, an order failure
//! warns against blind retries, a provisioning timeout says the order was
//! already placed.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::provision::AvailabilityReport;

/// The main error type for the ICS provisioning system.
#[derive(Debug, Error)]
pub enum IcsError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// ICS API transport errors.
    #[error("ICS API error: {0}")]
    Api(#[from] ApiError),

    /// Catalog or credential resolution errors.
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// Server order errors.
    #[error("Server order failed: {0}")]
    Order(#[from] OrderError),

    /// Provisioning wait errors.
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    /// Resource lifecycle errors.
    #[error("{0}")]
    Resource(#[from] ResourceError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Planning errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A setting has a value that cannot be used.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Name of the setting.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// ICS API transport errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API token was rejected.
    #[error("ICS authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The API answered with a non-success HTTP status.
    #[error("API request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response envelope reported a failure.
    #[error("API returned status code {status_code}: {message}")]
    Envelope {
        /// `statusCode` from the envelope.
        status_code: u16,
        /// `message` from the envelope.
        message: String,
    },

    /// Rate limited.
    #[error("ICS API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with ICS: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// The request did not complete within the client timeout.
    #[error("Request to {endpoint} timed out")]
    Timeout {
        /// Endpoint that timed out.
        endpoint: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from ICS API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Catalog and credential resolution errors.
///
/// Every variant carries enough context to tell the user what they could
/// ask for instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No inventory entry carries this instance type at all.
    #[error("Instance type '{instance_type}' does not exist in the inventory{report}")]
    UnknownInstanceType {
        /// Requested instance type.
        instance_type: String,
        /// Alternatives computed from the same snapshot.
        report: AvailabilityReport,
    },

    /// The type exists but not with auto-provisionable capacity at the location.
    #[error("Instance type '{instance_type}' is not available in location '{location}'{report}")]
    NoCapacity {
        /// Requested instance type.
        instance_type: String,
        /// Requested location (may be empty).
        location: String,
        /// Alternatives computed from the same snapshot.
        report: AvailabilityReport,
    },

    /// The operating system is not offered for the SKU at the location.
    #[error(
        "Operating system '{operating_system}' is not available for instance type '{instance_type}' in location '{location}'\n\nAvailable operating systems: {}",
        available.join(", ")
    )]
    OperatingSystemNotFound {
        /// Requested operating system name.
        operating_system: String,
        /// Instance type the catalog was fetched for.
        instance_type: String,
        /// Location the catalog was fetched for.
        location: String,
        /// Every operating system name offered for the pair.
        available: Vec<String>,
    },

    /// An SSH key label does not exist on the account.
    #[error("SSH key with label '{label}' not found. Create it before ordering the server.")]
    SshKeyNotFound {
        /// The missing label.
        label: String,
    },
}

/// Server order errors.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order succeeded at HTTP level but returned no service identifiers.
    #[error("no service IDs returned from server order")]
    EmptyServiceIds,

    /// The order call timed out; the backend may still have accepted it.
    #[error(
        "the order request timed out, but the order may have been accepted. Check the ICS control panel for pending orders or run `ics refresh` before retrying: {source}"
    )]
    MaybeSubmitted {
        /// Underlying transport error.
        #[source]
        source: ApiError,
    },

    /// The order call failed after it may have reached the backend: the
    /// connection dropped mid-request or a success response could not be read.
    #[error(
        "the order response could not be confirmed, but the order may have been accepted. Check the ICS control panel for pending orders or run `ics refresh` before retrying: {source}"
    )]
    Unconfirmed {
        /// Underlying transport error.
        #[source]
        source: ApiError,
    },

    /// The order was rejected.
    #[error("unable to order server: {source}")]
    Rejected {
        /// Underlying transport error.
        #[source]
        source: ApiError,
    },
}

/// Provisioning wait errors.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The server did not appear before the deadline.
    #[error(
        "Server was ordered (service ID: {service_id}) but provisioning did not complete within {}s. Check the ICS control panel or run `ics refresh` later.",
        waited.as_secs()
    )]
    Timeout {
        /// Service identifier returned by the order.
        service_id: u64,
        /// Wall-clock time spent waiting.
        waited: Duration,
    },

    /// The wait was cancelled by the caller.
    #[error("Waiting for service ID {service_id} was cancelled; the order was already placed")]
    Cancelled {
        /// Service identifier returned by the order.
        service_id: u64,
    },
}

/// Resource lifecycle errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// No server carries the service identifier.
    #[error("Server with service ID {service_id} not found")]
    ServerNotFound {
        /// The missing service identifier.
        service_id: u64,
    },

    /// No SSH key carries the label.
    #[error("SSH key with label '{label}' not found")]
    SshKeyNotFound {
        /// The missing label.
        label: String,
    },

    /// A key was created but could not be read back.
    #[error("SSH key '{label}' was created but could not be retrieved")]
    CreatedKeyMissing {
        /// Label used at creation.
        label: String,
    },

    /// Import identifier could not be parsed.
    #[error("Invalid service ID format: {value}")]
    InvalidImportId {
        /// The rejected identifier.
        value: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// A resource is already tracked under this key.
    #[error("{resource_type} '{name}' is already tracked in state")]
    AlreadyTracked {
        /// Type of resource.
        resource_type: String,
        /// Key in state.
        name: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan contains replacements and the caller did not allow them.
    #[error("{resource} requires replacement ({fields}); re-run with --allow-replace to destroy and recreate it")]
    ReplacementNotAllowed {
        /// Resource that needs replacement.
        resource: String,
        /// Fields whose change forces replacement.
        fields: String,
    },

    /// Execution stopped after a failed action.
    #[error("Plan execution stopped after {failed} failed action(s)")]
    ExecutionFailed {
        /// Number of failed actions.
        failed: usize,
    },

    /// Execution was interrupted before the plan finished.
    #[error("Apply interrupted with {remaining} action(s) not run; run `ics refresh` before the next apply")]
    Interrupted {
        /// Actions that never started.
        remaining: usize,
    },

    /// Tracked resources no longer exist.
    #[error("{count} tracked resource(s) no longer exist; remove them from the manifest or re-import them")]
    Drift {
        /// Number of missing resources.
        count: usize,
    },
}

/// Result type alias for ICS operations.
pub type Result<T> = std::result::Result<T, IcsError>;

impl IcsError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is a transient transport failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(
                ApiError::RateLimited { .. }
                    | ApiError::NetworkError { .. }
                    | ApiError::Timeout { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns true if the operation may have had a remote effect despite failing.
    #[must_use]
    pub const fn may_have_side_effects(&self) -> bool {
        matches!(
            self,
            Self::Order(OrderError::MaybeSubmitted { .. } | OrderError::Unconfirmed { .. })
                | Self::Provision(_)
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ApiError {
    /// Creates a non-success status error.
    #[must_use]
    pub fn request_failed(status: u16, body: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            body: body.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}
