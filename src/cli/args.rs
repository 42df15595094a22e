// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// modhost - Pluggable Module Host
///
/// Discovers, loads and runs shared-library modules.
#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(author = "Eshan Roy")]
#[command(version)]
#[command(about = "Pluggable module host", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "MODHOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Modules directory (overrides the configuration)
    #[arg(long, global = true, env = "MODHOST_DIR")]
    pub dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Output format for CI and scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON output for machine parsing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load every module once, report the outcome and unload them again
    Scan,

    /// Load every module and keep them running until interrupted
    Run,

    /// Print version information
    Version,

    /// Write an example modhost.toml in the current directory
    Init(InitArgs),
}

/// Arguments for the init command.
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,
}

impl Cli {
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}
