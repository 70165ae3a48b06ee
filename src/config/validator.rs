//! Manifest validation.
//!
//! Catches mistakes that can be detected without talking to the API, so
//! that nothing is ordered from a manifest that is obviously wrong. Catalog
//! checks (instance type, location, operating system) happen later against
//! live data.

use crate::error::{ConfigError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{Manifest, ServerSpec, SshKeySpec};

/// Public key prefixes accepted by the API.
const KEY_ALGORITHMS: &[&str] = &[
    "ssh-rsa",
    "ssh-ed25519",
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// Maximum hostname length.
const MAX_HOSTNAME_LEN: usize = 253;

/// Validator for resource manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ManifestValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if result.errors.is_empty() {
            debug!("Manifest validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into())
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        if manifest.is_empty() {
            result
                .warnings
                .push(String::from("No servers or SSH keys defined in manifest"));
            return result;
        }

        let declared = Self::validate_ssh_keys(&manifest.ssh_keys, &mut result);
        Self::validate_servers(&manifest.servers, &declared, &mut result);

        result
    }

    /// Validates SSH key specs and returns the set of declared labels.
    fn validate_ssh_keys<'m>(
        keys: &'m [SshKeySpec],
        result: &mut ValidationResult,
    ) -> HashSet<&'m str> {
        let mut labels = HashSet::new();

        for (i, key) in keys.iter().enumerate() {
            let prefix = format!("ssh_keys[{i}]");

            if key.label.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.label"),
                    message: String::from("SSH key label cannot be empty"),
                });
            } else if !labels.insert(key.label.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.label"),
                    message: format!("Duplicate SSH key label: {}", key.label),
                });
            }

            let algorithm = key.public_key.split_whitespace().next().unwrap_or_default();
            if key.public_key.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.public_key"),
                    message: String::from("Public key cannot be empty"),
                });
            } else if !KEY_ALGORITHMS.contains(&algorithm)
                || key.public_key.split_whitespace().nth(1).is_none()
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.public_key"),
                    message: format!(
                        "Public key for '{}' is not in OpenSSH format (\"<algorithm> <base64> [comment]\")",
                        key.label
                    ),
                });
            }
        }

        labels
    }

    /// Validates server specs.
    fn validate_servers(
        servers: &[ServerSpec],
        declared_keys: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let mut seen_names = HashSet::new();

        for (i, server) in servers.iter().enumerate() {
            let prefix = format!("servers[{i}]");

            if !seen_names.insert(server.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate server name: {}", server.name),
                });
            }

            if !is_valid_name(&server.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Server name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        server.name
                    ),
                });
            }

            for (field, value) in [
                ("instance_type", &server.instance_type),
                ("location", &server.location),
                ("operating_system", &server.operating_system),
            ] {
                if value.trim().is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.{field}"),
                        message: format!("{field} cannot be empty"),
                    });
                }
            }

            if let Some(hostname) = &server.hostname
                && !is_valid_hostname(hostname)
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.hostname"),
                    message: format!("Hostname '{hostname}' is not a valid DNS name"),
                });
            }

            if server.friendly_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.friendly_name"),
                    message: String::from("Friendly name cannot be blank; omit it instead"),
                });
            }

            let mut server_labels = HashSet::new();
            for (j, label) in server.ssh_key_labels.iter().enumerate() {
                if !server_labels.insert(label.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.ssh_key_labels[{j}]"),
                        message: format!("SSH key label '{label}' listed twice"),
                    });
                } else if !declared_keys.contains(label.as_str()) {
                    result.warnings.push(format!(
                        "{prefix}.ssh_key_labels[{j}]: '{label}' is not declared in this manifest and must already exist on the account"
                    ));
                }
            }
        }
    }
}

/// Checks if a name is valid (lowercase alphanumeric with single hyphens).
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let chars: Vec<char> = name.chars().collect();

    if !chars[0].is_ascii_lowercase() {
        return false;
    }

    if chars[chars.len() - 1] == '-' {
        return false;
    }

    let mut prev_hyphen = false;
    for c in &chars {
        if *c == '-' {
            if prev_hyphen {
                return false;
            }
            prev_hyphen = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_hyphen = false;
        } else {
            return false;
        }
    }

    true
}

/// Checks if a hostname is a syntactically valid DNS name.
fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA ops@example";

    fn server(name: &str) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            instance_type: String::from("c1.small"),
            location: String::from("NYC1"),
            operating_system: String::from("Ubuntu 24.04"),
            hostname: None,
            friendly_name: None,
            ssh_key_labels: vec![],
        }
    }

    fn key(label: &str) -> SshKeySpec {
        SshKeySpec {
            label: label.to_string(),
            public_key: KEY.to_string(),
        }
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web-1"));
        assert!(is_valid_name("a"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web-1"));
        assert!(!is_valid_name("1-web"));
        assert!(!is_valid_name("web_1"));
        assert!(!is_valid_name("web-"));
        assert!(!is_valid_name("web--1"));
    }

    #[test]
    fn test_valid_hostname() {
        assert!(is_valid_hostname("web-1.example.com"));
        assert!(is_valid_hostname("node7"));
        assert!(!is_valid_hostname("-web.example.com"));
        assert!(!is_valid_hostname("web..example.com"));
        assert!(!is_valid_hostname("web_1.example.com"));
    }

    #[test]
    fn test_valid_manifest_passes() {
        let mut web = server("web-1");
        web.ssh_key_labels = vec![String::from("ops")];
        let manifest = Manifest {
            ssh_keys: vec![key("ops")],
            servers: vec![web],
        };

        let result = ManifestValidator::new().validate(&manifest).expect("valid");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_duplicates_are_errors() {
        let manifest = Manifest {
            ssh_keys: vec![key("ops"), key("ops")],
            servers: vec![server("web-1"), server("web-1")],
        };

        let result = ManifestValidator::new().check(&manifest);
        assert_eq!(result.errors.len(), 2);
        assert!(ManifestValidator::new().validate(&manifest).is_err());
    }

    #[test]
    fn test_bad_public_key() {
        let manifest = Manifest {
            ssh_keys: vec![SshKeySpec {
                label: String::from("ops"),
                public_key: String::from("not-a-key"),
            }],
            servers: vec![],
        };

        let result = ManifestValidator::new().check(&manifest);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "ssh_keys[0].public_key");
    }

    #[test]
    fn test_undeclared_label_is_warning() {
        let mut web = server("web-1");
        web.ssh_key_labels = vec![String::from("remote-only")];
        let manifest = Manifest {
            ssh_keys: vec![],
            servers: vec![web],
        };

        let result = ManifestValidator::new().check(&manifest);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_repeated_label_on_server_is_error() {
        let mut web = server("web-1");
        web.ssh_key_labels = vec![String::from("ops"), String::from("ops")];
        let manifest = Manifest {
            ssh_keys: vec![key("ops")],
            servers: vec![web],
        };

        let result = ManifestValidator::new().check(&manifest);
        assert_eq!(result.errors.len(), 1);
    }
}
