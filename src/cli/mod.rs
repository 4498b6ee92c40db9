//! CLI module for azrm
//!
//! This module provides the command-line interface for azrm: one-shot module
//! invocation plus catalog inspection.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// azrm - Declarative Azure Resource Manager modules
///
/// Reads module arguments, converges one resource (or gathers facts) and
/// prints a single JSON result record.
#[derive(Parser, Debug, Clone)]
#[command(name = "azrm")]
#[command(author = "azrm Contributors")]
#[command(version)]
#[command(about = "Declarative, idempotent Azure Resource Manager modules", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "AZRM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Additional module catalog layered over the built-in one
    #[arg(long, global = true, env = "AZRM_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one module
    Run(commands::run::RunArgs),

    /// List available modules
    List(commands::list::ListArgs),

    /// Show the argument schema of a module
    Describe(commands::describe::DescribeArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
