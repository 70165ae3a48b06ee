//! CLI module for the ics provisioning tool.
//!
//! This module provides the command-line interface for managing
//! bare-metal servers and SSH keys on Ingenuity Cloud Services.

mod commands;
mod output;

pub use commands::{Cli, Commands, ImportCommands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
