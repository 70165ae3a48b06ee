//! Lifecycle controllers.
//!
//! Servers and SSH keys have separate controllers that share nothing but
//! the API handle: their identity keys and replacement rules differ too
//! much for a common abstraction to pay off.

mod server;
mod ssh_key;

pub use server::{CreatedServer, ServerController};
pub use ssh_key::SshKeyController;

/// Result of comparing a resource's current and desired definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing to do.
    NoChange,
    /// Applied in place.
    InPlace {
        /// Fields that were changed.
        fields: Vec<&'static str>,
    },
    /// The change cannot be applied in place; the resource must be destroyed
    /// and recreated. Nothing was sent to the API.
    RequiresReplacement {
        /// Fields whose change forces replacement.
        fields: Vec<&'static str>,
    },
}

impl UpdateOutcome {
    /// Returns true if the resource must be replaced.
    #[must_use]
    pub const fn requires_replacement(&self) -> bool {
        matches!(self, Self::RequiresReplacement { .. })
    }
}
