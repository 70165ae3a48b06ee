//! State management module.
//!
//! This module records which remote servers and SSH keys belong to which
//! manifest entries, along with their last observed details and a short
//! operation history.

mod local;
mod lock;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, MAX_LEASE_SECS, generate_holder_id};
pub use store::StateStore;
pub use types::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, STATE_VERSION, ServerState,
    SshKeyState,
};
