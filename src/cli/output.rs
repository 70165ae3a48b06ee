//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::ics::{InventoryItem, OperatingSystemItem};
use crate::planner::{ActionType, DeploymentPlan, ExecutionResult, RefreshReport};
use crate::state::DeploymentState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Inventory row for table display.
#[derive(Tabled)]
struct InventoryRow {
    #[tabled(rename = "Type")]
    instance_type: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "RAM")]
    ram: String,
    #[tabled(rename = "Available")]
    available: u32,
    #[tabled(rename = "Hourly")]
    hourly: String,
}

/// Operating system row for table display.
#[derive(Tabled)]
struct OperatingSystemRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    os_type: String,
    #[tabled(rename = "Product code")]
    product_code: String,
    #[tabled(rename = "Hourly")]
    hourly: String,
}

/// Tracked resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(plan),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - {} resource(s) up to date.\n",
                "✓".green(),
                plan.unchanged
            );
        }

        let mut output = String::from("\nExecution Plan\n\n");

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: a.resource.to_string(),
                reason: Self::truncate(&a.reason, 60),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let creates = plan.count(ActionType::CreateServer) + plan.count(ActionType::CreateSshKey);
        let updates = plan.count(ActionType::UpdateServer);
        let replaces = plan.count(ActionType::ReplaceServer) + plan.count(ActionType::ReplaceSshKey);
        let deletes = plan.count(ActionType::DeleteServer) + plan.count(ActionType::DeleteSshKey);

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to destroy\n",
            creates.to_string().green(),
            updates.to_string().yellow(),
            replaces.to_string().magenta(),
            deletes.to_string().red()
        );

        if plan.has_replacements() {
            let _ = write!(
                output,
                "\n{} Replacing a server cancels it and orders a new one; its data and IP are lost.\n   Re-run apply with --allow-replace to proceed.\n",
                "⚠".yellow()
            );
        }

        output
    }

    /// Formats the outcome of an apply or destroy.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "success": result.success,
                "cancelled": result.cancelled,
                "executed": result.total_executed,
                "successful": result.successful,
                "failed": result.failed,
                "skipped": result.skipped,
                "results": result.results.iter().map(|r| serde_json::json!({
                    "index": r.index,
                    "action": r.action.action_type,
                    "resource": r.action.resource.to_string(),
                    "success": r.success,
                    "error": r.error,
                    "warnings": r.warnings,
                })).collect::<Vec<_>>(),
            })),
            OutputFormat::Text => {
                let mut output = String::new();
                for r in &result.results {
                    if r.success {
                        let _ = writeln!(output, "{} {}", "✓".green(), r.action.description());
                    } else {
                        let _ = writeln!(
                            output,
                            "{} {}: {}",
                            "✗".red(),
                            r.action.description(),
                            r.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    for warning in &r.warnings {
                        let _ = writeln!(output, "  {} {warning}", "⚠".yellow());
                    }
                }
                if result.cancelled {
                    let _ = writeln!(output, "{} Interrupted", "⚠".yellow());
                }
                let _ = writeln!(output, "\n{result}");
                output
            }
        }
    }

    /// Formats inventory items.
    #[must_use]
    pub fn format_inventory(&self, items: &[InventoryItem]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&items),
            OutputFormat::Text => {
                if items.is_empty() {
                    return String::from("No inventory matches.\n");
                }
                let rows: Vec<InventoryRow> = items
                    .iter()
                    .map(|i| InventoryRow {
                        instance_type: i.sku_product_name.clone(),
                        location: i.location_code.clone(),
                        cpu: format!("{}x {} ({} cores)", i.cpu_count, i.cpu_model, i.cpu_cores),
                        ram: format!("{} GB", i.total_ram_gb),
                        available: i.auto_provision_quantity,
                        hourly: format!("{} {}", i.price_hourly, i.currency_code),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats operating system options.
    #[must_use]
    pub fn format_operating_systems(&self, items: &[OperatingSystemItem]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&items),
            OutputFormat::Text => {
                if items.is_empty() {
                    return String::from("No operating systems offered.\n");
                }
                let rows: Vec<OperatingSystemRow> = items
                    .iter()
                    .map(|os| OperatingSystemRow {
                        name: os.name.clone(),
                        os_type: os.os_type.clone(),
                        product_code: os.product_code.clone(),
                        hourly: format!("{:.4}", os.price_hourly),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "refreshed": report.refreshed,
                "drifted": report
                    .drifted
                    .iter()
                    .map(|(resource, reason)| serde_json::json!({
                        "resource": resource,
                        "reason": reason,
                    }))
                    .collect::<Vec<_>>(),
            })),
            OutputFormat::Text => {
                if !report.has_drift() {
                    return format!("{} {report}\n", "✓".green());
                }
                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for (resource, reason) in &report.drifted {
                    let _ = writeln!(output, "   - {resource}: {reason}");
                }
                let _ = write!(output, "\n{report}\n");
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result
                    .errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect::<Vec<_>>(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Manifest is valid\n", "✓".green())
                } else {
                    format!("{} Manifest is invalid\n", "✗".red())
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats deployment state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState (version {})", state.version);
                let _ = writeln!(output, "   Last updated: {}\n", state.last_updated);

                let mut rows: Vec<ResourceRow> = state
                    .ssh_keys
                    .values()
                    .map(|k| ResourceRow {
                        resource: format!("ssh_key/{}", k.spec.label),
                        id: k.key.id.to_string(),
                        details: Self::truncate(&k.key.key, 40),
                    })
                    .collect();
                rows.extend(state.servers.values().map(|s| ResourceRow {
                    resource: format!("server/{}", s.spec.name),
                    id: if s.server.id.is_empty() {
                        format!("(pending, service {})", s.server.service_id)
                    } else {
                        s.server.id.clone()
                    },
                    details: format!(
                        "{} {} {}",
                        s.spec.instance_type, s.spec.location, s.server.public_ip
                    ),
                }));

                if rows.is_empty() {
                    output.push_str("   No resources tracked.\n");
                } else {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a one-line message.
    #[must_use]
    pub fn format_message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                to_json(&serde_json::json!({ "status": status, "message": message }))
            }
            OutputFormat::Text => match status {
                "success" => format!("{} {message}", "✓".green()),
                "error" => format!("{} {message}", "✗".red()),
                "warning" => format!("{} {message}", "⚠".yellow()),
                _ => message.to_string(),
            },
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        let label = format!("{}{action_type}", action_type.symbol());
        match action_type {
            ActionType::CreateSshKey | ActionType::CreateServer => label.green().to_string(),
            ActionType::UpdateServer => label.yellow().to_string(),
            ActionType::ReplaceSshKey | ActionType::ReplaceServer => label.magenta().to_string(),
            ActionType::DeleteSshKey | ActionType::DeleteServer => label.red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
