//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ics - Declarative bare-metal provisioning for Ingenuity Cloud Services.
#[derive(Parser, Debug)]
#[command(name = "ics")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the resource manifest.
    #[arg(short, long, global = true, env = "ICS_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// API token (falls back to `ICS_API_TOKEN`, including from `.env`).
    #[arg(long, global = true)]
    pub api_token: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter manifest and `.env.example`.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the manifest without contacting the API.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List hardware inventory.
    Inventory {
        /// Only show this location code.
        #[arg(short, long)]
        location: Option<String>,

        /// Only show this instance type.
        #[arg(short = 't', long = "type")]
        instance_type: Option<String>,

        /// Only show items that can be provisioned now.
        #[arg(short, long)]
        available: bool,
    },

    /// List operating systems installable on an instance type at a location.
    Os {
        /// Instance type (e.g. `c1.small`).
        instance_type: String,

        /// Location code (e.g. `NYC1`).
        location: String,
    },

    /// Show what apply would change.
    Plan,

    /// Apply the manifest.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Allow servers and keys to be destroyed and recreated.
        #[arg(long)]
        allow_replace: bool,

        /// Continue on errors.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Re-read every tracked resource from the API.
    Refresh,

    /// Adopt existing resources into state.
    Import {
        /// Import subcommand.
        #[command(subcommand)]
        command: ImportCommands,
    },

    /// Delete every tracked resource.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect or repair state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Import subcommands.
#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Adopt a server by service ID.
    Server {
        /// Service ID shown in the control panel.
        service_id: String,

        /// Manifest name to track it under.
        #[arg(short, long)]
        name: String,
    },

    /// Adopt an SSH key by label.
    SshKey {
        /// Key label.
        label: String,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Remove the state lock.
    Unlock {
        /// Required; removing another process's lock is unsafe.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
