//! Provider settings resolved from flags, environment and `.env`.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::ics::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::provision::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PROVISION_TIMEOUT_SECS};

/// Environment variable holding the API token.
pub const ENV_API_TOKEN: &str = "ICS_API_TOKEN";

/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "ICS_BASE_URL";

/// Environment variable overriding the per-request timeout.
pub const ENV_REQUEST_TIMEOUT: &str = "ICS_REQUEST_TIMEOUT_SECS";

/// Environment variable overriding the provisioning poll interval.
pub const ENV_POLL_INTERVAL: &str = "ICS_POLL_INTERVAL_SECS";

/// Environment variable overriding the provisioning deadline.
pub const ENV_PROVISION_TIMEOUT: &str = "ICS_PROVISION_TIMEOUT_SECS";

/// Connection and timing settings for talking to ICS.
#[derive(Clone)]
pub struct ProviderSettings {
    /// API token sent as `X-Api-Token`.
    pub api_token: String,
    /// API base URL.
    pub base_url: String,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Fixed delay between provisioning polls.
    pub poll_interval: Duration,
    /// Wall-clock deadline for a server to appear after ordering.
    pub provision_timeout: Duration,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("provision_timeout", &self.provision_timeout)
            .finish()
    }
}

impl ProviderSettings {
    /// Creates settings with defaults for everything but the token.
    #[must_use]
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: String::from(DEFAULT_BASE_URL),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            provision_timeout: Duration::from_secs(DEFAULT_PROVISION_TIMEOUT_SECS),
        }
    }

    /// Resolves settings from an explicit token or the environment.
    ///
    /// An explicit token wins over `ICS_API_TOKEN`. Timing overrides are
    /// read from the environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is available or an override is not a number.
    pub fn resolve(api_token: Option<&str>) -> Result<Self> {
        let token = match api_token.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => std::env::var(ENV_API_TOKEN)
                .ok()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar {
                    name: String::from(ENV_API_TOKEN),
                })?,
        };

        let mut settings = Self::new(token);

        if let Ok(base_url) = std::env::var(ENV_BASE_URL)
            && !base_url.is_empty()
        {
            debug!("Overriding base URL from environment");
            settings.base_url = base_url;
        }

        if let Some(secs) = read_secs(ENV_REQUEST_TIMEOUT)? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_secs(ENV_POLL_INTERVAL)? {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = read_secs(ENV_PROVISION_TIMEOUT)? {
            settings.provision_timeout = Duration::from_secs(secs);
        }

        Ok(settings)
    }

    /// Loads a `.env` file from `dir` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_dotenv(dir: &Path) -> Result<()> {
        let env_path = dir.join(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Reads an optional numeric seconds override.
fn read_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            let secs = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: value.clone(),
            })?;
            debug!("Overriding {name} from environment");
            Ok(Some(secs))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_token_and_defaults() {
        let settings = ProviderSettings::new("abc");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.provision_timeout, Duration::from_secs(30 * 60));
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = ProviderSettings::new("super-secret");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_resolve_prefers_explicit_token() {
        let settings = ProviderSettings::resolve(Some("from-flag")).expect("settings");
        assert_eq!(settings.api_token, "from-flag");
    }

    #[test]
    fn test_load_dotenv_missing_file_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(ProviderSettings::load_dotenv(dir.path()).is_ok());
    }
}
