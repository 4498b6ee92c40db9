//! Module system for azrm
//!
//! This module provides the core traits, types, and registry for azrm modules.
//! A module binds one resource kind (or one read-only query) to the shared
//! engines; every module is built from a catalog descriptor rather than
//! hand-written code.

pub mod info;
pub mod resource;

pub use info::FactsModule;
pub use resource::ResourceModule;

use crate::arm::{single_line, ArmClient, CloudError, CloudErrorKind, Coordinates};
use crate::catalog::Catalog;
use crate::retry::PollPolicy;
use crate::schema::{binder, ArgumentSchema, BoundArgs};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reserved argument selecting dry-run mode.
pub const CHECK_MODE_ARG: &str = "_check_mode";

/// Reserved argument selecting diff mode.
pub const DIFF_MODE_ARG: &str = "_diff";

/// Errors that can occur during module execution
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Every binder violation found in one pass.
    #[error("{}", .0.join("; "))]
    InvalidArguments(Vec<String>),

    #[error("{operation} failed for {coordinates}: {source}")]
    Cloud {
        operation: String,
        coordinates: String,
        source: CloudError,
    },

    #[error("{operation} did not complete: {message}")]
    Transient { operation: String, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ModuleError {
    /// Annotate a client failure with the operation and the coordinates it
    /// addressed. Operations the client does not provide become
    /// [`ModuleError::Unsupported`].
    pub fn cloud(operation: &str, coords: &Coordinates, source: CloudError) -> Self {
        if source.kind == CloudErrorKind::Unsupported {
            return Self::Unsupported(format!("{} on {}: {}", operation, coords, source));
        }
        Self::Cloud {
            operation: operation.to_string(),
            coordinates: coords.to_string(),
            source,
        }
    }

    pub fn transient(operation: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Structured failure class.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_)
            | Self::InvalidParameter(_)
            | Self::MissingParameter(_)
            | Self::InvalidArguments(_) => FailureKind::Input,
            Self::Cloud { .. } => FailureKind::Cloud,
            Self::Transient { .. } => FailureKind::Transient,
            Self::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// The uniform failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Binder or schema violation, raised before any network activity.
    Input,
    /// Anything the gateway or client reported.
    Cloud,
    /// Delete confirmation or long-running operation ran out of time.
    Transient,
    /// The descriptor asks for an operation that cannot be performed.
    Unsupported,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Input => write!(f, "input"),
            FailureKind::Cloud => write!(f, "cloud"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A module error plus whether a mutation had already been issued.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct Failure {
    pub error: ModuleError,
    pub changed: bool,
}

impl Failure {
    pub fn new(error: ModuleError, changed: bool) -> Self {
        Self { error, changed }
    }

    /// Failure raised after the cloud side was asked to mutate.
    pub fn after_mutation(error: ModuleError) -> Self {
        Self::new(error, true)
    }

    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }

    /// Single-line message for the result record.
    pub fn message(&self) -> String {
        single_line(&self.error.to_string())
    }

    pub fn into_output(self) -> ModuleOutput {
        let mut output = ModuleOutput::failed(self.kind(), self.message());
        output.changed = self.changed;
        output
    }
}

impl From<ModuleError> for Failure {
    fn from(error: ModuleError) -> Self {
        Self::new(error, false)
    }
}

/// Status of a module execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Module executed successfully and made changes
    Changed,
    /// Module executed successfully but no changes were needed
    Ok,
    /// Module execution failed
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Changed => write!(f, "changed"),
            ModuleStatus::Ok => write!(f, "ok"),
            ModuleStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Before/after view of a resource, emitted in diff mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// State before the module ran
    pub before: Value,
    /// State the module produced (or would produce in check mode)
    pub after: Value,
    /// Unified diff of the pretty-printed states
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Diff {
    pub fn between(before: Value, after: Value) -> Self {
        let old = pretty(&before);
        let new = pretty(&after);
        let details = if old == new {
            None
        } else {
            Some(
                TextDiff::from_lines(&old, &new)
                    .unified_diff()
                    .context_radius(3)
                    .header("before", "after")
                    .to_string(),
            )
        };
        Self {
            before,
            after,
            details,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_none()
    }
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}

/// Result record of a module execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Whether the module changed anything
    pub changed: bool,
    /// Set on failure only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    /// Single-line message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Structured failure class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Optional diff showing what changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    /// Resource payload and invocation echo
    #[serde(flatten)]
    pub data: IndexMap<String, Value>,
}

impl ModuleOutput {
    /// Create a new successful output with no changes
    pub fn ok() -> Self {
        Self {
            changed: false,
            failed: false,
            msg: None,
            failure_kind: None,
            diff: None,
            data: IndexMap::new(),
        }
    }

    /// Create a new successful output with changes
    pub fn changed() -> Self {
        Self {
            changed: true,
            ..Self::ok()
        }
    }

    /// Create a failed output
    pub fn failed(kind: FailureKind, msg: impl Into<String>) -> Self {
        Self {
            failed: true,
            msg: Some(msg.into()),
            failure_kind: Some(kind),
            ..Self::ok()
        }
    }

    /// Successful output whose `changed` flag is given.
    pub fn with_changed(changed: bool) -> Self {
        if changed {
            Self::changed()
        } else {
            Self::ok()
        }
    }

    /// Add a diff to the output
    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Add data to the output
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Attach the echo of the bound arguments.
    pub fn with_invocation(self, module_args: Value) -> Self {
        self.with_data("invocation", serde_json::json!({ "module_args": module_args }))
    }

    pub fn status(&self) -> ModuleStatus {
        if self.failed {
            ModuleStatus::Failed
        } else if self.changed {
            ModuleStatus::Changed
        } else {
            ModuleStatus::Ok
        }
    }
}

/// Parameters passed to a module
pub type ModuleParams = serde_json::Map<String, Value>;

/// Context for module execution
#[derive(Clone)]
pub struct ModuleContext {
    /// Whether to run in check mode (dry run)
    pub check_mode: bool,
    /// Whether to show diffs
    pub diff_mode: bool,
    /// ARM capability every gateway call goes through
    pub client: Arc<dyn ArmClient>,
    /// Ceiling for long-running operations
    pub polling: PollPolicy,
    /// Ceiling for the post-delete absence check
    pub delete_confirmation: PollPolicy,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("check_mode", &self.check_mode)
            .field("diff_mode", &self.diff_mode)
            .field("polling", &self.polling)
            .field("delete_confirmation", &self.delete_confirmation)
            .finish_non_exhaustive()
    }
}

impl ModuleContext {
    pub fn new(client: Arc<dyn ArmClient>) -> Self {
        Self {
            check_mode: false,
            diff_mode: false,
            client,
            polling: PollPolicy::default(),
            delete_confirmation: PollPolicy::constant(10, Duration::from_secs(5)),
        }
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: bool) -> Self {
        self.diff_mode = diff_mode;
        self
    }

    pub fn with_polling(mut self, polling: PollPolicy) -> Self {
        self.polling = polling;
        self
    }

    pub fn with_delete_confirmation(mut self, policy: PollPolicy) -> Self {
        self.delete_confirmation = policy;
        self
    }
}

/// Trait that all modules must implement
#[async_trait]
pub trait Module: Send + Sync {
    /// Returns the name of the module
    fn name(&self) -> &str;

    /// Returns a description of what the module does
    fn description(&self) -> &str;

    /// Full argument schema, common arguments included
    fn schema(&self) -> &ArgumentSchema;

    /// Key the resource payload is published under
    fn result_key(&self) -> &str;

    /// Whether the module can change cloud state
    fn is_mutating(&self) -> bool {
        true
    }

    /// Execute the module with already bound arguments
    async fn execute(
        &self,
        args: &BoundArgs,
        context: &ModuleContext,
    ) -> Result<ModuleOutput, Failure>;
}

/// Helper trait for extracting parameters
pub trait ParamExt {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>>;
    fn get_string_required(&self, key: &str) -> ModuleResult<String>;
    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>>;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_i64(&self, key: &str) -> ModuleResult<Option<i64>>;
    fn get_u32(&self, key: &str) -> ModuleResult<Option<u32>>;
    fn get_vec_string(&self, key: &str) -> ModuleResult<Option<Vec<String>>>;
}

impl ParamExt for ModuleParams {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v) => Ok(Some(v.to_string().trim_matches('"').to_string())),
        }
    }

    fn get_string_required(&self, key: &str) -> ModuleResult<String> {
        self.get_string(key)?
            .ok_or_else(|| ModuleError::MissingParameter(key.to_string()))
    }

    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Some(true)),
                "false" | "no" | "0" | "off" => Ok(Some(false)),
                _ => Err(ModuleError::InvalidParameter(format!(
                    "{} must be a boolean",
                    key
                ))),
            },
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a boolean",
                key
            ))),
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).ok().flatten().unwrap_or(default)
    }

    fn get_i64(&self, key: &str) -> ModuleResult<Option<i64>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| {
                ModuleError::InvalidParameter(format!("{} must be an integer", key))
            }),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| ModuleError::InvalidParameter(format!("{} must be an integer", key))),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be an integer",
                key
            ))),
        }
    }

    fn get_u32(&self, key: &str) -> ModuleResult<Option<u32>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    ModuleError::InvalidParameter(format!("{} must be a positive integer", key))
                }),
            Some(Value::String(s)) => s.parse().map(Some).map_err(|_| {
                ModuleError::InvalidParameter(format!("{} must be a positive integer", key))
            }),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a positive integer",
                key
            ))),
        }
    }

    fn get_vec_string(&self, key: &str) -> ModuleResult<Option<Vec<String>>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(arr)) => {
                let mut result = Vec::new();
                for item in arr {
                    match item {
                        Value::String(s) => result.push(s.clone()),
                        v => result.push(v.to_string().trim_matches('"').to_string()),
                    }
                }
                Ok(Some(result))
            }
            Some(Value::String(s)) => {
                // Handle comma-separated string
                Ok(Some(s.split(',').map(|s| s.trim().to_string()).collect()))
            }
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be an array",
                key
            ))),
        }
    }
}

/// Registry for looking up modules by name
pub struct ModuleRegistry {
    modules: IndexMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            modules: IndexMap::new(),
        }
    }

    /// Create a registry with one module per catalog descriptor
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut registry = Self::new();
        for descriptor in &catalog.resources {
            registry.register(Arc::new(ResourceModule::new(descriptor.clone())));
        }
        for descriptor in &catalog.facts {
            registry.register(Arc::new(FactsModule::new(descriptor.clone())));
        }
        registry
    }

    /// Register a module
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Check if a module exists
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Get all module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Bind raw arguments against a module's schema without running it.
    ///
    /// Reserved arguments are validated and stripped first, exactly as
    /// [`ModuleRegistry::execute`] does. Needs no client.
    pub fn bind_args(&self, name: &str, params: &ModuleParams) -> ModuleResult<BoundArgs> {
        let module = self
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        params.get_bool(CHECK_MODE_ARG)?;
        params.get_bool(DIFF_MODE_ARG)?;
        binder::bind(module.schema(), &strip_reserved(params))
    }

    /// Run a module by name against raw, unbound arguments.
    ///
    /// Failures are folded into the returned record (`failed: true`), so the
    /// caller always gets exactly one output. Reserved `_check_mode` and
    /// `_diff` arguments override the context flags.
    pub async fn execute(
        &self,
        name: &str,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleOutput {
        let module = match self.get(name) {
            Some(module) => module,
            None => {
                return Failure::from(ModuleError::NotFound(name.to_string())).into_output();
            }
        };

        let (params, context) = match Self::consume_reserved(params, context) {
            Ok(split) => split,
            Err(e) => return Failure::from(e).into_output(),
        };

        let bound = match binder::bind(module.schema(), &params) {
            Ok(bound) => bound,
            Err(e) => {
                debug!("Arguments for {} rejected: {}", name, e);
                return Failure::from(e).into_output();
            }
        };

        info!(
            "Running {} (check_mode={}, diff_mode={})",
            name, context.check_mode, context.diff_mode
        );

        let output = match module.execute(&bound, &context).await {
            Ok(output) => output,
            Err(failure) => {
                warn!("{} failed ({}): {}", name, failure.kind(), failure.message());
                failure.into_output()
            }
        };

        output.with_invocation(bound.echo())
    }

    fn consume_reserved(
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<(ModuleParams, ModuleContext)> {
        let mut context = context.clone();
        if let Some(check) = params.get_bool(CHECK_MODE_ARG)? {
            context.check_mode = check;
        }
        if let Some(diff) = params.get_bool(DIFF_MODE_ARG)? {
            context.diff_mode = diff;
        }

        Ok((strip_reserved(params), context))
    }
}

fn strip_reserved(params: &ModuleParams) -> ModuleParams {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != CHECK_MODE_ARG && key.as_str() != DIFF_MODE_ARG)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
