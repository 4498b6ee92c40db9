//! Describe command - Show a module's argument schema

use super::CommandContext;
use anyhow::Result;
use clap::Parser;

/// Arguments for the describe command
#[derive(Parser, Debug, Clone)]
pub struct DescribeArgs {
    /// Module name
    pub module: String,
}

impl DescribeArgs {
    /// Execute the describe command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let registry = ctx.registry()?;
        let Some(module) = registry.get(&self.module) else {
            ctx.output
                .error(&format!("Module '{}' not found", self.module));
            return Ok(azrm::error::exit_code_for(azrm::modules::FailureKind::Input));
        };

        ctx.output.section(module.name());
        if !module.description().is_empty() {
            println!("{}\n", module.description());
        }
        println!("result key: {}", module.result_key());
        println!("arguments:");
        let schema = serde_yaml::to_string(module.schema())?;
        for line in schema.lines() {
            println!("  {}", line);
        }
        Ok(0)
    }
}
