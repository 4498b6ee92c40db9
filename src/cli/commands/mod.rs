//! Subcommands module for azrm CLI
//!
//! This module contains all the subcommand implementations.

pub mod describe;
pub mod list;
pub mod run;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use azrm::catalog::Catalog;
use azrm::config::Config;
use azrm::modules::ModuleRegistry;
use std::path::PathBuf;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// User catalog layered over the built-in one
    pub catalog_path: Option<PathBuf>,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.verbosity());

        Self {
            config,
            output,
            catalog_path: cli.catalog.clone(),
        }
    }

    /// The effective catalog
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::builtin()?;
        if let Some(path) = &self.catalog_path {
            let extra = Catalog::load(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            catalog.extend(extra);
        }
        Ok(catalog)
    }

    /// Registry with one module per catalog entry
    pub fn registry(&self) -> Result<ModuleRegistry> {
        Ok(ModuleRegistry::from_catalog(&self.catalog()?))
    }
}
