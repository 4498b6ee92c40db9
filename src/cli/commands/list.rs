//! List command - Show available modules

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde_json::json;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Print a JSON array instead of a table
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let registry = ctx.registry()?;
        let mut modules = Vec::new();
        for name in registry.names() {
            if let Some(module) = registry.get(name) {
                modules.push(module);
            }
        }

        if self.json {
            let entries: Vec<_> = modules
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name(),
                        "mutating": m.is_mutating(),
                        "result_key": m.result_key(),
                        "description": m.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(0);
        }

        ctx.output.section("Modules");
        let rows: Vec<Vec<String>> = modules
            .iter()
            .map(|m| {
                vec![
                    m.name().to_string(),
                    if m.is_mutating() { "resource" } else { "facts" }.to_string(),
                    m.description().to_string(),
                ]
            })
            .collect();
        ctx.output.table(&["NAME", "TYPE", "DESCRIPTION"], &rows);
        Ok(0)
    }
}
