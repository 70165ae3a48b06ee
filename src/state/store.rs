//! State store trait definition.

use async_trait::async_trait;
use std::time::Duration;

use super::lock::LockInfo;
use super::types::DeploymentState;
use crate::error::Result;

/// Where deployment state is kept and how access to it is serialized.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the deployment state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<DeploymentState>>;

    /// Loads the state, or an empty one if none exists.
    async fn load_or_default(&self) -> Result<DeploymentState> {
        Ok(self.load().await?.unwrap_or_default())
    }

    /// Saves the deployment state.
    async fn save(&self, state: &DeploymentState) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires the state lock. An empty `holder` generates one for this
    /// process.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Extends the lease of the lock identified by `lock_id`.
    ///
    /// Fails if the lock was released, force-removed, or taken over.
    async fn renew_lock(&self, lock_id: &str, lease: Duration) -> Result<LockInfo>;

    /// Releases the lock if `lock_id` still holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Removes any lock regardless of holder.
    async fn force_unlock(&self) -> Result<Option<LockInfo>>;

    /// Short name of the backend, shown by `ics state show`.
    fn backend_type(&self) -> &'static str;
}
