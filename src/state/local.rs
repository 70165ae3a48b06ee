//! Local file-based state storage backend.
//!
//! State lives in `.ics/state.json` next to the manifest, guarded by
//! `.ics/state.lock`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{IcsError, Result, StateError};

use super::lock::{LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{DeploymentState, STATE_VERSION};

/// Default state directory name.
pub const STATE_DIR: &str = ".ics";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store in `.ics` under the given project directory.
    #[must_use]
    pub fn in_project(project_dir: &Path) -> Self {
        Self::with_base_dir(project_dir.join(STATE_DIR))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StateError::write(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }

    /// Reads the lock file if it exists.
    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| {
            IcsError::State(StateError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            })
        })?;

        let lock_info: LockInfo = serde_json::from_str(&content).map_err(|e| {
            IcsError::State(StateError::Corrupted {
                message: format!("Failed to parse lock file: {e}"),
            })
        })?;

        Ok(Some(lock_info))
    }

    /// Writes a file through a temp file and rename.
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;

        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write temp file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync temp file: {e}")))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename temp file: {e}")))?;

        Ok(())
    }

    /// Writes the lock file.
    async fn write_lock_file(&self, lock_info: &LockInfo) -> Result<()> {
        let content = serde_json::to_string_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.write_atomic(&self.lock_path, &content)
            .await
            .map_err(|e| {
                IcsError::State(StateError::LockFailed {
                    message: e.to_string(),
                })
            })
    }

    /// Deletes the lock file.
    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| {
                IcsError::State(StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            IcsError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: DeploymentState = serde_json::from_str(&content).map_err(|e| {
            IcsError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;

        if state.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }
            .into());
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        debug!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        self.write_atomic(&self.state_path, &content).await?;

        debug!("State saved successfully");
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(IcsError::State(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        self.write_lock_file(&lock_info).await?;

        debug!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id,
            lock_info.remaining_secs()
        );

        Ok(lock_info)
    }

    async fn renew_lock(&self, lock_id: &str, lease: Duration) -> Result<LockInfo> {
        let mut lock_info = match self.read_lock_file().await? {
            Some(existing) if existing.lock_id == lock_id => existing,
            Some(existing) => {
                return Err(StateError::LockFailed {
                    message: format!("lock {lock_id} was taken over by {}", existing.holder),
                }
                .into());
            }
            None => {
                return Err(StateError::LockFailed {
                    message: format!("lock {lock_id} was removed"),
                }
                .into());
            }
        };

        lock_info.renew(lease);
        self.write_lock_file(&lock_info).await?;
        debug!(
            "Renewed state lock: {lock_id} (expires in {}s)",
            lock_info.remaining_secs()
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                debug!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let existing = self.read_lock_file().await?;
        if let Some(lock) = &existing {
            warn!("Force-removing state lock held by {}", lock.holder);
            self.delete_lock_file().await?;
            info!("State lock removed");
        }
        Ok(existing)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DeploymentHistoryEntry, DeploymentOperation};
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::in_project(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, temp) = create_test_store();

        let mut state = DeploymentState::new();
        state.add_history(DeploymentHistoryEntry::new(
            DeploymentOperation::Import,
            vec![String::from("ssh_key/ops")],
        ));
        store.save(&state).await.expect("Failed to save state");

        assert!(temp.path().join(".ics").join("state.json").exists());
        assert!(!temp.path().join(".ics").join("state.json.tmp").exists());

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");
        assert_eq!(loaded.history.len(), 1);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        assert!(store.load().await.expect("load").is_none());
        assert!(store.load_or_default().await.expect("load").is_empty());
        assert!(!store.exists().await.expect("exists"));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let (store, _temp) = create_test_store();

        let mut state = DeploymentState::new();
        state.version = String::from("0.1");
        store.save(&state).await.expect("save");

        let err = store.load().await.unwrap_err();
        assert!(matches!(
            err,
            IcsError::State(StateError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder")
            .await
            .expect("Failed to acquire lock");
        assert!(store.get_lock_info().await.expect("info").is_some());

        store
            .release_lock(&lock.lock_id)
            .await
            .expect("Failed to release lock");
        assert!(store.get_lock_info().await.expect("info").is_none());
    }

    #[tokio::test]
    async fn test_lock_conflict_and_force_unlock() {
        let (store, _temp) = create_test_store();

        let _lock1 = store
            .acquire_lock("holder-1")
            .await
            .expect("Failed to acquire first lock");

        let result = store.acquire_lock("holder-2").await;
        assert!(matches!(
            result,
            Err(IcsError::State(StateError::LockedByOther { .. }))
        ));

        let removed = store.force_unlock().await.expect("unlock");
        assert_eq!(removed.map(|l| l.holder), Some(String::from("holder-1")));
        store.acquire_lock("holder-2").await.expect("lock after unlock");
    }

    #[tokio::test]
    async fn test_renew_lock_extends_lease() {
        let (store, _temp) = create_test_store();

        let lock = store.acquire_lock("holder-1").await.expect("lock");
        let renewed = store
            .renew_lock(&lock.lock_id, Duration::from_secs(3600))
            .await
            .expect("renew");

        assert!(renewed.expires_at > lock.expires_at);
        let on_disk = store.get_lock_info().await.expect("info").expect("locked");
        assert_eq!(on_disk.expires_at, renewed.expires_at);
        assert_eq!(store.backend_type(), "local");
    }

    #[tokio::test]
    async fn test_renew_fails_after_force_unlock() {
        let (store, _temp) = create_test_store();

        let lock = store.acquire_lock("holder-1").await.expect("lock");
        store.force_unlock().await.expect("unlock");

        let err = store
            .renew_lock(&lock.lock_id, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, IcsError::State(StateError::LockFailed { .. })));
        assert!(err.to_string().contains("removed"));
    }
}
