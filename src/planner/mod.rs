//! Planning module for deployment operations.
//!
//! This module compares the manifest with recorded state, turns the
//! differences into an ordered plan, and applies it. It also keeps state
//! honest through refresh and import.

mod diff;
mod executor;
mod plan;
mod refresh;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff, ResourceRef};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
pub use refresh::{RefreshReport, Refresher};
