//! SSH key lifecycle.
//!
//! Keys are identified by label. They are never modified in place; any
//! change means delete and recreate.

use tracing::{debug, info};

use crate::config::SshKeySpec;
use crate::error::{ResourceError, Result};
use crate::ics::{CreateSshKeyRequest, IcsApi, SshKey};

use super::UpdateOutcome;

/// Creates, reads, deletes and imports SSH keys.
pub struct SshKeyController<'a> {
    api: &'a dyn IcsApi,
}

impl<'a> SshKeyController<'a> {
    /// Creates a controller.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi) -> Self {
        Self { api }
    }

    /// Registers a key and reads it back by label.
    ///
    /// Duplicate labels are rejected by the API, not here.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::CreatedKeyMissing`] if the key cannot be
    /// found right after creation, or a transport error.
    pub async fn create(&self, spec: &SshKeySpec) -> Result<SshKey> {
        info!("Creating SSH key '{}'", spec.label);

        let created = self
            .api
            .create_ssh_key(&CreateSshKeyRequest {
                public_key: spec.public_key.clone(),
                label: spec.label.clone(),
            })
            .await?;
        debug!("Create returned SSH key id {}", created.id);

        let key = self.find(&spec.label).await?.ok_or_else(|| {
            ResourceError::CreatedKeyMissing {
                label: spec.label.clone(),
            }
        })?;

        info!("SSH key '{}' created (id {})", key.label, key.id);
        Ok(key)
    }

    /// Re-fetches a key by label.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SshKeyNotFound`] if no key has the label.
    pub async fn read(&self, label: &str) -> Result<SshKey> {
        self.find(label).await?.ok_or_else(|| {
            ResourceError::SshKeyNotFound {
                label: label.to_string(),
            }
            .into()
        })
    }

    /// Compares definitions. Any difference requires replacement.
    #[must_use]
    pub fn update(&self, current: &SshKeySpec, desired: &SshKeySpec) -> UpdateOutcome {
        let fields = desired.changes(current);
        if fields.is_empty() {
            UpdateOutcome::NoChange
        } else {
            UpdateOutcome::RequiresReplacement { fields }
        }
    }

    /// Deletes a key by numeric ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete call fails.
    pub async fn delete(&self, key_id: u64) -> Result<()> {
        info!("Deleting SSH key {key_id}");
        self.api.delete_ssh_key(key_id).await
    }

    /// Looks up an existing key by label.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub async fn import(&self, label: &str) -> Result<SshKey> {
        self.read(label).await
    }

    async fn find(&self, label: &str) -> Result<Option<SshKey>> {
        let keys = self.api.list_ssh_keys().await?;
        Ok(keys.into_iter().find(|k| k.label == label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IcsError;
    use crate::ics::MockIcsApi;
    use crate::ics::fake::FakeIcs;

    fn spec() -> SshKeySpec {
        SshKeySpec {
            label: String::from("ops"),
            public_key: String::from("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA ops@example"),
        }
    }

    #[tokio::test]
    async fn test_create_then_lookup_echoes_input() {
        let api = FakeIcs::new();
        let controller = SshKeyController::new(&api);

        let created = controller.create(&spec()).await.expect("created");
        assert_eq!(created.label, spec().label);
        assert_eq!(created.key, spec().public_key);

        let read = controller.read("ops").await.expect("read");
        assert_eq!(read, created);
    }

    #[tokio::test]
    async fn test_missing_after_create_is_loud() {
        let api = FakeIcs::new();
        *api.drop_created_keys.lock().expect("flag") = true;

        let err = SshKeyController::new(&api)
            .create(&spec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IcsError::Resource(ResourceError::CreatedKeyMissing { .. })
        ));
    }

    #[test]
    fn test_any_change_requires_replacement() {
        let api = MockIcsApi::new();
        let controller = SshKeyController::new(&api);

        let mut rotated = spec();
        rotated.public_key = String::from("ssh-rsa AAAAB3NzaC1yc2E ops@example");

        assert_eq!(controller.update(&spec(), &spec()), UpdateOutcome::NoChange);
        assert_eq!(
            controller.update(&spec(), &rotated),
            UpdateOutcome::RequiresReplacement {
                fields: vec!["public_key"]
            }
        );
    }

    #[tokio::test]
    async fn test_read_is_exact_label_match() {
        let mut api = MockIcsApi::new();
        api.expect_list_ssh_keys().returning(|| {
            Ok(vec![SshKey {
                id: 3,
                label: String::from("OPS"),
                ..SshKey::default()
            }])
        });

        let err = SshKeyController::new(&api).import("ops").await.unwrap_err();
        assert!(matches!(
            err,
            IcsError::Resource(ResourceError::SshKeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_by_numeric_id() {
        let mut api = MockIcsApi::new();
        api.expect_delete_ssh_key()
            .withf(|id| *id == 3)
            .times(1)
            .returning(|_| Ok(()));

        SshKeyController::new(&api).delete(3).await.expect("deleted");
    }
}
