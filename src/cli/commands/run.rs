//! Run command - Execute one module
//!
//! Arguments are read as a JSON or YAML mapping from a file or stdin. The
//! result record goes to stdout; the exit status reflects the failure kind.

use super::CommandContext;
use anyhow::{bail, Context, Result};
use azrm::config::Config;
use azrm::error::exit_code_for;
use azrm::modules::{Failure, ModuleContext, ModuleError, ModuleParams};
use clap::Parser;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Module name, e.g. azure_rm_storageaccount
    pub module: String,

    /// File holding the argument mapping (JSON or YAML); `-` reads stdin
    #[arg(long, short = 'a')]
    pub args: Option<PathBuf>,

    /// Run in check mode (dry-run, don't make changes)
    #[arg(long)]
    pub check: bool,

    /// Report before/after state
    #[arg(long)]
    pub diff: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let registry = ctx.registry()?;

        let params = match &self.args {
            Some(path) => match read_params(path) {
                Ok(params) => params,
                Err(e) => {
                    return self.reject(ctx, ModuleError::InvalidParameter(format!("{:#}", e)));
                }
            },
            None => ModuleParams::new(),
        };
        debug!("{} argument keys: {:?}", self.module, params.keys().collect::<Vec<_>>());

        // Input problems are reported before credentials are looked at.
        if let Err(e) = registry.bind_args(&self.module, &params) {
            return self.reject(ctx, e);
        }
        if self.check && registry.get(&self.module).is_some_and(|m| !m.is_mutating()) {
            ctx.output
                .warning(&format!("{} only reads; --check has no effect", self.module));
        }

        let token = Config::access_token()?;
        let client = ctx.config.rest_client(token)?;
        let context = ModuleContext::new(Arc::new(client))
            .with_check_mode(self.check)
            .with_diff_mode(self.diff)
            .with_polling(ctx.config.polling_policy())
            .with_delete_confirmation(ctx.config.delete_confirmation());

        let output = registry.execute(&self.module, &params, &context).await;
        ctx.output.record(&self.module, &output)?;

        Ok(match output.failure_kind {
            Some(kind) => exit_code_for(kind),
            None if output.failed => 1,
            None => 0,
        })
    }

    /// Print the failure record for rejected input.
    fn reject(&self, ctx: &CommandContext, error: ModuleError) -> Result<i32> {
        let failure = Failure::from(error);
        let code = exit_code_for(failure.kind());
        ctx.output.record(&self.module, &failure.into_output())?;
        Ok(code)
    }
}

/// Read the argument mapping from a file, or stdin for `-`
fn read_params(path: &Path) -> Result<ModuleParams> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read arguments from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read arguments file: {}", path.display()))?
    };
    parse_params(&text)
}

/// JSON is valid YAML, so one parser handles both.
fn parse_params(text: &str) -> Result<ModuleParams> {
    if text.trim().is_empty() {
        return Ok(ModuleParams::new());
    }
    let value: Value = serde_yaml::from_str(text).context("Arguments are not valid JSON or YAML")?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ModuleParams::new()),
        _ => bail!("Arguments must be a mapping"),
    }
}
