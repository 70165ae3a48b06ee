//! State locking.
//!
//! A lock file keeps two `ics` processes from applying against the same
//! state at once. A lock is a lease: it expires unless its holder renews
//! it, so a crashed process does not wedge the directory forever. Apply
//! renews the lease before each action, long enough to cover the
//! provisioning wait that action may start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Lease granted on acquisition, in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300; // 5 minutes

/// Longest lease a renewal grants, in seconds.
pub const MAX_LEASE_SECS: i64 = 7 * 24 * 3600;

/// Information about a state lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lease runs out.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a lock with the default lease.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Moves the expiry to `lease` from now, capped at [`MAX_LEASE_SECS`].
    ///
    /// Never shortens a lease that already runs longer.
    pub fn renew(&mut self, lease: Duration) {
        let secs = i64::try_from(lease.as_secs()).map_or(MAX_LEASE_SECS, |s| s.min(MAX_LEASE_SECS));
        let expires_at = Utc::now() + chrono::Duration::seconds(secs);
        self.expires_at = self.expires_at.max(expires_at);
    }

    /// Checks if the lease has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the seconds left on the lease.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

/// Builds a holder identifier for this process: `hostname-pid-shortuuid`.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}
