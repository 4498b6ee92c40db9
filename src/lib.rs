//! # azrm - Declarative Azure Resource Manager modules
//!
//! azrm exposes Azure resources as idempotent, declarative modules. Each
//! module is a catalog entry (argument schema, collection path, API version,
//! output projection) driven by one shared reconciliation engine: read the
//! current resource, compare it with the desired state, mutate only when
//! needed, wait for long-running operations, and report a single result
//! record.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                              │
//! │                    (clap-based command parsing)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │           Module Registry (one module per catalog entry)             │
//! │                 argument binding · no_log redaction                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┴─────────────────────────┐
//!          ▼                                                   ▼
//! ┌─────────────────────────────┐               ┌─────────────────────────────┐
//! │    Reconciliation engine    │               │       Facts dispatcher       │
//! │ read · decide · mutate ·    │               │   get / list · tag filters   │
//! │ confirm                     │               │                              │
//! └─────────────────────────────┘               └─────────────────────────────┘
//!          │                                                   │
//!          └─────────────────────────┬─────────────────────────┘
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │             Resource gateway · LRO poller · ARM client               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use azrm::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = ModuleRegistry::from_catalog(&Catalog::builtin()?);
//! let context = ModuleContext::new(Arc::new(client));
//! let params: ModuleParams = serde_json::from_value(serde_json::json!({
//!     "name": "rg1",
//!     "location": "westus",
//! }))?;
//!
//! let output = registry.execute("azure_rm_resourcegroup", &params, &context).await;
//! println!("{}", serde_json::to_string_pretty(&output)?);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::arm::{ArmClient, CloudError, Collection, Coordinates, RestClient};
    pub use crate::catalog::Catalog;
    pub use crate::engine::{reconcile, Action, OperationSet, Outcome, ResourceDescriptor};
    pub use crate::error::{Error, Result};
    pub use crate::facts::FactsDescriptor;
    pub use crate::modules::{
        FailureKind, Module, ModuleContext, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult,
    };
    pub use crate::retry::PollPolicy;
    pub use crate::schema::{ArgSpec, ArgType, ArgumentSchema};
}

// ============================================================================
// Core
// ============================================================================

/// Error types and result aliases for azrm operations.
pub mod error;

/// Configuration loading: defaults, config files and environment overrides.
pub mod config;

/// Retry and polling policies shared by the LRO poller and delete confirmation.
pub mod retry;

// ============================================================================
// Cloud access
// ============================================================================

/// The Azure Resource Manager client abstraction, the resource gateway and
/// long-running operation handling.
pub mod arm;

// ============================================================================
// Engine
// ============================================================================

/// Argument schemas and the binder that validates raw module arguments.
pub mod schema;

/// Sensitive values and `no_log` redaction.
pub mod redact;

/// Semantic comparison and deep merge of JSON documents.
pub mod compare;

/// Tag reconciliation and tag filters.
pub mod tags;

/// Output projection of observed resources.
pub mod format;

/// Resource descriptors and the reconciliation state machine.
pub mod engine;

/// Facts (`_info`) descriptors and the listing dispatcher.
pub mod facts;

/// The module catalog: built-in and user-supplied descriptors.
pub mod catalog;

/// Module trait, registry and the resource and facts modules.
pub mod modules;

// ============================================================================
// Version Information
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
