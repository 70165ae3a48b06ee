//! Plan executor for applying deployment plans.
//!
//! Actions run one at a time in plan order. State is saved after every
//! action so that an interrupted apply never loses track of a server that
//! was already ordered.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Manifest, ServerSpec};
use crate::error::{IcsError, PlanError, ProvisionError, ResourceError, Result};
use crate::ics::{IcsApi, Server};
use crate::provision::{CancelSignal, PollPolicy};
use crate::resources::{ServerController, SshKeyController, UpdateOutcome};
use crate::state::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, LOCK_EXPIRY_SECS, ServerState,
    SshKeyState, StateStore,
};

use super::diff::ResourceRef;
use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Executor for deployment plans.
pub struct PlanExecutor<'a> {
    api: &'a dyn IcsApi,
    store: &'a dyn StateStore,
    policy: PollPolicy,
    allow_replace: bool,
    continue_on_error: bool,
    lock_id: Option<&'a str>,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// Whether the action succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions executed.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions not attempted.
    pub skipped: usize,
    /// Whether execution was interrupted.
    pub cancelled: bool,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(api: &'a dyn IcsApi, store: &'a dyn StateStore, policy: PollPolicy) -> Self {
        Self {
            api,
            store,
            policy,
            allow_replace: false,
            continue_on_error: false,
            lock_id: None,
        }
    }

    /// Renews the state lock `lock_id` before each action.
    #[must_use]
    pub const fn with_lock(mut self, lock_id: &'a str) -> Self {
        self.lock_id = Some(lock_id);
        self
    }

    /// Sets whether replace actions may run.
    #[must_use]
    pub const fn with_allow_replace(mut self, allow_replace: bool) -> Self {
        self.allow_replace = allow_replace;
        self
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a deployment plan against `state`, saving after each action.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ReplacementNotAllowed`] before doing anything if
    /// the plan replaces a resource and replacement was not allowed, or a
    /// state error if saving fails or the lock can no longer be renewed.
    /// Action failures are reported in the result.
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        manifest: &Manifest,
        state: &mut DeploymentState,
        cancel: &mut CancelSignal,
    ) -> Result<ExecutionResult> {
        info!("Executing deployment plan with {} actions", plan.actions.len());

        plan.check_replacements(self.allow_replace)?;

        let mut results = Vec::new();
        let mut cancelled = false;

        for (index, action) in plan.actions.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Apply interrupted; {} action(s) not started", plan.actions.len() - index);
                cancelled = true;
                break;
            }

            if let Some(lock_id) = self.lock_id {
                self.store.renew_lock(lock_id, self.lease()).await?;
            }

            info!("Executing action {index}: {}", action.description());
            let outcome = self.execute_action(action, manifest, state, cancel).await;
            let resources = vec![action.resource.to_string()];
            let operation = operation_for(action.action_type);

            let result = match outcome {
                Ok(warnings) => {
                    state.add_history(DeploymentHistoryEntry::new(operation, resources));
                    ActionResult {
                        index,
                        action: action.clone(),
                        success: true,
                        error: None,
                        warnings,
                    }
                }
                Err(e) => {
                    error!("Failed to {}: {e}", action.description().to_lowercase());
                    if e.may_have_side_effects() {
                        warn!("{} may exist remotely; run `ics refresh` to check", action.resource);
                    }
                    if matches!(e, IcsError::Provision(ProvisionError::Cancelled { .. })) {
                        cancelled = true;
                    }
                    state.add_history(DeploymentHistoryEntry::failed(
                        operation,
                        resources,
                        &e.to_string(),
                    ));
                    ActionResult {
                        index,
                        action: action.clone(),
                        success: false,
                        error: Some(e.to_string()),
                        warnings: vec![],
                    }
                }
            };

            self.store.save(state).await?;

            let failed = !result.success;
            results.push(result);
            if cancelled || (failed && !self.continue_on_error) {
                break;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;

        Ok(ExecutionResult {
            total_executed: results.len(),
            successful,
            failed,
            skipped: plan.actions.len() - results.len(),
            cancelled,
            success: failed == 0 && !cancelled,
            results,
        })
    }

    /// Lock lease covering one action: the provisioning wait plus slack.
    fn lease(&self) -> Duration {
        self.policy
            .deadline
            .saturating_add(Duration::from_secs(LOCK_EXPIRY_SECS.unsigned_abs()))
    }

    /// Executes a single action, returning its warnings.
    async fn execute_action(
        &self,
        action: &PlannedAction,
        manifest: &Manifest,
        state: &mut DeploymentState,
        cancel: &mut CancelSignal,
    ) -> Result<Vec<String>> {
        match (&action.resource, action.action_type) {
            (ResourceRef::SshKey(label), ActionType::CreateSshKey) => {
                self.create_ssh_key(label, manifest, state).await?;
                Ok(vec![])
            }
            (ResourceRef::SshKey(label), ActionType::ReplaceSshKey) => {
                self.delete_ssh_key(label, state).await?;
                self.store.save(state).await?;
                self.create_ssh_key(label, manifest, state).await?;
                Ok(vec![])
            }
            (ResourceRef::SshKey(label), ActionType::DeleteSshKey) => {
                self.delete_ssh_key(label, state).await?;
                Ok(vec![])
            }
            (ResourceRef::Server(name), ActionType::CreateServer) => {
                self.create_server(name, manifest, state, cancel).await
            }
            (ResourceRef::Server(name), ActionType::UpdateServer) => {
                self.update_server(name, manifest, state).await?;
                Ok(vec![])
            }
            (ResourceRef::Server(name), ActionType::ReplaceServer) => {
                self.delete_server(name, state).await?;
                self.store.save(state).await?;
                self.create_server(name, manifest, state, cancel).await
            }
            (ResourceRef::Server(name), ActionType::DeleteServer) => {
                self.delete_server(name, state).await?;
                Ok(vec![])
            }
            (resource, action_type) => Err(IcsError::internal(format!(
                "cannot {action_type} {resource}"
            ))),
        }
    }

    async fn create_ssh_key(
        &self,
        label: &str,
        manifest: &Manifest,
        state: &mut DeploymentState,
    ) -> Result<()> {
        let spec = manifest
            .ssh_key(label)
            .ok_or_else(|| IcsError::internal(format!("SSH key '{label}' is not in the manifest")))?;

        let key = SshKeyController::new(self.api).create(spec).await?;
        info!("Registered SSH key '{label}' (ID: {})", key.id);
        state.set_ssh_key(SshKeyState::new(spec.clone(), key));
        Ok(())
    }

    async fn delete_ssh_key(&self, label: &str, state: &mut DeploymentState) -> Result<()> {
        let Some(recorded) = state.get_ssh_key(label) else {
            debug!("SSH key '{label}' is not tracked, nothing to delete");
            return Ok(());
        };

        SshKeyController::new(self.api)
            .delete(recorded.key.id)
            .await?;
        state.remove_ssh_key(label);
        Ok(())
    }

    async fn create_server(
        &self,
        name: &str,
        manifest: &Manifest,
        state: &mut DeploymentState,
        cancel: &mut CancelSignal,
    ) -> Result<Vec<String>> {
        let spec = manifest
            .server(name)
            .ok_or_else(|| IcsError::internal(format!("Server '{name}' is not in the manifest")))?;

        match ServerController::new(self.api, self.policy)
            .create(spec, cancel)
            .await
        {
            Ok(created) => {
                state.set_server(ServerState::new(spec.clone(), created.server));
                Ok(created.warnings)
            }
            Err(e) => {
                if let IcsError::Provision(
                    ProvisionError::Timeout { service_id, .. }
                    | ProvisionError::Cancelled { service_id },
                ) = &e
                {
                    record_pending(state, spec, *service_id);
                }
                Err(e)
            }
        }
    }

    async fn update_server(
        &self,
        name: &str,
        manifest: &Manifest,
        state: &mut DeploymentState,
    ) -> Result<()> {
        let desired = manifest
            .server(name)
            .ok_or_else(|| IcsError::internal(format!("Server '{name}' is not in the manifest")))?;
        let Some(recorded) = state.servers.get_mut(name) else {
            return Err(IcsError::internal(format!("Server '{name}' is not tracked")));
        };

        let controller = ServerController::new(self.api, self.policy);

        if recorded.server.id.is_empty() {
            let server = controller.read(recorded.server.service_id).await?;
            debug!("Resolved pending server '{name}' to {}", server.id);
            recorded.refresh(server);
        }

        let outcome = controller
            .update(&recorded.server.id, &recorded.spec, desired)
            .await?;

        match outcome {
            UpdateOutcome::RequiresReplacement { fields } => {
                Err(PlanError::ReplacementNotAllowed {
                    resource: ResourceRef::Server(name.to_string()).to_string(),
                    fields: fields.join(", "),
                }
                .into())
            }
            UpdateOutcome::InPlace { .. } | UpdateOutcome::NoChange => {
                if let Some(friendly_name) = &desired.friendly_name {
                    recorded.server.friendly_name.clone_from(friendly_name);
                }
                recorded.spec = desired.clone();
                recorded.updated_at = chrono::Utc::now();
                Ok(())
            }
        }
    }

    async fn delete_server(&self, name: &str, state: &mut DeploymentState) -> Result<()> {
        let Some(recorded) = state.get_server(name) else {
            debug!("Server '{name}' is not tracked, nothing to delete");
            return Ok(());
        };

        let controller = ServerController::new(self.api, self.policy);

        // Entries recorded while provisioning was pending carry no server ID yet.
        let server_id = if recorded.server.id.is_empty() {
            match controller.read(recorded.server.service_id).await {
                Ok(server) => server.id,
                Err(IcsError::Resource(ResourceError::ServerNotFound { service_id })) => {
                    warn!("Server '{name}' (service ID {service_id}) no longer exists");
                    state.remove_server(name);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            recorded.server.id.clone()
        };

        controller.delete(&server_id).await?;
        state.remove_server(name);
        Ok(())
    }
}

/// Tracks an ordered server whose provisioning did not finish.
fn record_pending(state: &mut DeploymentState, spec: &ServerSpec, service_id: u64) {
    warn!(
        "Server '{}' was ordered (service ID {service_id}) but is not ready; recording it so a later refresh can pick it up",
        spec.name
    );
    state.set_server(ServerState::new(
        spec.clone(),
        Server {
            service_id,
            ..Server::default()
        },
    ));
}

const fn operation_for(action_type: ActionType) -> DeploymentOperation {
    match action_type {
        ActionType::CreateSshKey | ActionType::CreateServer => DeploymentOperation::Create,
        ActionType::UpdateServer => DeploymentOperation::Update,
        ActionType::ReplaceSshKey | ActionType::ReplaceServer => DeploymentOperation::Replace,
        ActionType::DeleteSshKey | ActionType::DeleteServer => DeploymentOperation::Delete,
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// Collects every warning raised during execution.
    #[must_use]
    pub fn warnings(&self) -> Vec<&str> {
        self.results
            .iter()
            .flat_map(|r| r.warnings.iter().map(String::as_str))
            .collect()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )
    }
}
