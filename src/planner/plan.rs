//! Deployment plan types and construction.
//!
//! This module defines the structure of deployment plans and provides
//! functionality for converting diffs into executable plans.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PlanError, Result};

use super::diff::{DiffDetail, DiffResult, DiffType, ResourceRef};

/// A complete deployment plan.
#[derive(Debug, Serialize)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Resources that need nothing.
    pub unchanged: usize,
}

/// A single planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource acted on.
    #[serde(serialize_with = "serialize_ref")]
    pub resource: ResourceRef,
    /// Reason for this action.
    pub reason: String,
    /// Field changes behind the action.
    #[serde(skip)]
    pub details: Vec<DiffDetail>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Register a new SSH key.
    CreateSshKey,
    /// Delete and re-register an SSH key.
    ReplaceSshKey,
    /// Delete an SSH key.
    DeleteSshKey,
    /// Order a new server.
    CreateServer,
    /// Rename a server in place.
    UpdateServer,
    /// Cancel a server and order a new one.
    ReplaceServer,
    /// Cancel a server.
    DeleteServer,
}

fn classify(resource: &ResourceRef, diff_type: DiffType) -> Option<(ActionType, &'static str)> {
    let classified = match (resource, diff_type) {
        (_, DiffType::NoChange) => return None,
        (ResourceRef::SshKey(_), DiffType::Create) => {
            (ActionType::CreateSshKey, "SSH key defined in manifest")
        }
        // Keys have no in-place attributes.
        (ResourceRef::SshKey(_), DiffType::Replace | DiffType::Update) => {
            (ActionType::ReplaceSshKey, "SSH key changed")
        }
        (ResourceRef::SshKey(_), DiffType::Delete) => {
            (ActionType::DeleteSshKey, "SSH key removed from manifest")
        }
        (ResourceRef::Server(_), DiffType::Create) => {
            (ActionType::CreateServer, "Server defined in manifest")
        }
        (ResourceRef::Server(_), DiffType::Update) => {
            (ActionType::UpdateServer, "Friendly name changed")
        }
        (ResourceRef::Server(_), DiffType::Replace) => {
            (ActionType::ReplaceServer, "Server changed")
        }
        (ResourceRef::Server(_), DiffType::Delete) => {
            (ActionType::DeleteServer, "Server removed from manifest")
        }
    };
    Some(classified)
}

fn serialize_ref<S: serde::Serializer>(
    r: &ResourceRef,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(r)
}

impl DeploymentPlan {
    /// Creates a plan from a diff result.
    ///
    /// Keys are registered before any server that may reference them is
    /// ordered, and retired only after every server is done with them.
    #[must_use]
    pub fn from_diff(diff: &DiffResult) -> Self {
        let mut actions: Vec<PlannedAction> = diff
            .diffs
            .iter()
            .filter_map(|resource_diff| {
                let (action_type, reason) =
                    classify(&resource_diff.resource, resource_diff.diff_type)?;
                let reason = if resource_diff.details.is_empty() {
                    reason.to_string()
                } else {
                    let fields: Vec<&str> = resource_diff
                        .details
                        .iter()
                        .map(|d| d.field.as_str())
                        .collect();
                    format!("{reason}: {}", fields.join(", "))
                };
                Some(PlannedAction {
                    action_type,
                    resource: resource_diff.resource.clone(),
                    reason,
                    details: resource_diff.details.clone(),
                })
            })
            .collect();

        // Stable, so diff order is kept within a phase.
        actions.sort_by_key(|a| a.action_type.phase());

        Self {
            created_at: Utc::now(),
            actions,
            unchanged: diff.count(DiffType::NoChange),
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Counts actions of a given type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Returns true if any action destroys and recreates a resource.
    #[must_use]
    pub fn has_replacements(&self) -> bool {
        self.actions.iter().any(|a| a.action_type.is_replacement())
    }

    /// Refuses plans that replace resources unless `allow_replace` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ReplacementNotAllowed`] naming the first
    /// replacement and the fields that force it.
    pub fn check_replacements(&self, allow_replace: bool) -> Result<()> {
        if allow_replace {
            return Ok(());
        }
        match self.actions.iter().find(|a| a.action_type.is_replacement()) {
            Some(action) => {
                let fields: Vec<&str> = action.details.iter().map(|d| d.field.as_str()).collect();
                Err(PlanError::ReplacementNotAllowed {
                    resource: action.resource.to_string(),
                    fields: fields.join(", "),
                }
                .into())
            }
            None => Ok(()),
        }
    }

    /// Returns true if any action destroys a resource.
    #[must_use]
    pub fn has_destructive_actions(&self) -> bool {
        self.actions.iter().any(|a| a.action_type.is_destructive())
    }
}

impl ActionType {
    /// Position of this action type in execution order.
    const fn phase(self) -> u8 {
        match self {
            Self::CreateSshKey => 0,
            Self::ReplaceSshKey => 1,
            Self::DeleteServer => 2,
            Self::ReplaceServer => 3,
            Self::UpdateServer => 4,
            Self::CreateServer => 5,
            Self::DeleteSshKey => 6,
        }
    }

    /// Returns true for replace actions.
    #[must_use]
    pub const fn is_replacement(self) -> bool {
        matches!(self, Self::ReplaceServer | Self::ReplaceSshKey)
    }

    /// Returns true for actions that cancel or delete something.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(
            self,
            Self::ReplaceServer | Self::ReplaceSshKey | Self::DeleteServer | Self::DeleteSshKey
        )
    }

    /// Symbol used when rendering plans.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::CreateSshKey | Self::CreateServer => "+",
            Self::UpdateServer => "~",
            Self::ReplaceSshKey | Self::ReplaceServer => "-/+",
            Self::DeleteSshKey | Self::DeleteServer => "-",
        }
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::CreateSshKey | ActionType::CreateServer => {
                format!("Create {}", self.resource)
            }
            ActionType::UpdateServer => format!("Update {} in place", self.resource),
            ActionType::ReplaceSshKey | ActionType::ReplaceServer => {
                format!("Replace {}", self.resource)
            }
            ActionType::DeleteSshKey | ActionType::DeleteServer => {
                format!("Delete {}", self.resource)
            }
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreateSshKey | Self::CreateServer => "create",
            Self::UpdateServer => "update",
            Self::ReplaceSshKey | Self::ReplaceServer => "replace",
            Self::DeleteSshKey | Self::DeleteServer => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.resource)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}
