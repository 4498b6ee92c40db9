//! Error types for azrm.
//!
//! Module execution reports through [`ModuleError`] and the result record.
//! This type covers everything around it: configuration, catalogs, files
//! and the CLI edge, and maps each failure to a process exit status.

use crate::modules::{FailureKind, ModuleError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for azrm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for azrm.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Catalog Errors
    // ========================================================================
    /// A descriptor catalog could not be loaded or is inconsistent.
    #[error("Catalog error in '{source_name}': {message}")]
    Catalog {
        /// File path or `builtin`
        source_name: String,
        /// Error message
        message: String,
    },

    /// No module with this name is registered.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    // ========================================================================
    // Module Errors
    // ========================================================================
    /// Module failure surfaced at the CLI edge.
    #[error(transparent)]
    Module(#[from] ModuleError),

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new catalog error.
    pub fn catalog(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Catalog {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Module(e) => exit_code_for(e.kind()),
            Error::ModuleNotFound(_) => exit_code_for(FailureKind::Input),
            _ => 1,
        }
    }
}

/// Exit status for a failed module run.
pub fn exit_code_for(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::Input => 2,
        FailureKind::Cloud => 3,
        FailureKind::Transient => 4,
        FailureKind::Unsupported => 5,
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}
