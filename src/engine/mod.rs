//! Reconciliation engine for mutating resource modules.
//!
//! One invocation walks `Start → Read → Decide → Mutate → Confirm → Done`:
//!
//! - **Read** fetches the observed state through the [`Gateway`](crate::arm::Gateway).
//! - **Decide** picks one [`Action`] from the desired intent and whether the
//!   observed state already satisfies the desired body and tags.
//! - **Mutate** issues the mutation (skipped in dry-run) and resolves any
//!   long-running operation.
//! - **Confirm** polls for absence after deletes, or re-reads after
//!   create/update when the mutation result lacks expected fields.
//! - **Done** projects the final state through the descriptor's formatter.
//!
//! Resources are described by data ([`ResourceDescriptor`]), not code.

pub mod desired;
pub mod reconcile;

pub use desired::{DesiredState, Intent};
pub use reconcile::{reconcile, Outcome, Reconciler};

use crate::arm::{Collection, SUBSCRIPTION_PLACEHOLDER};
use crate::format::Formatter;
use crate::schema::ArgumentSchema;
use crate::tags::TagMode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which mutating operations a resource offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSet {
    /// One `create_or_update` (PUT) for both.
    #[default]
    CreateOrUpdate,
    /// `create` (PUT) and `update` (PATCH).
    Distinct,
    /// Can be created but never updated in place.
    CreateOnly,
    /// Always exists; can only be updated.
    UpdateOnly,
}

impl OperationSet {
    pub fn supports_create(&self) -> bool {
        !matches!(self, Self::UpdateOnly)
    }

    pub fn supports_update(&self) -> bool {
        !matches!(self, Self::CreateOnly)
    }

    /// Whether updates send only the desired fields (PATCH semantics).
    pub fn partial_update(&self) -> bool {
        matches!(self, Self::Distinct | Self::UpdateOnly)
    }
}

/// Binds one mutating module to a resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Module name, e.g. `azure_rm_sqlfirewallrule`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Key the formatted resource is published under.
    pub kind: String,
    pub collection: Collection,
    #[serde(default)]
    pub operations: OperationSet,
    /// Mode used when `append_tags` is not given.
    #[serde(default)]
    pub tag_mode: TagMode,
    /// Whether the resource carries ARM tags.
    #[serde(default = "default_true")]
    pub supports_tags: bool,
    /// Start full-replacement updates from the observed writable fields.
    /// When false the body holds only what the caller asked for.
    #[serde(default = "default_true")]
    pub merge_observed: bool,
    /// Poll for absence after a delete.
    #[serde(default = "default_true")]
    pub post_delete_wait: bool,
    /// Fields a mutation result must carry to be taken as the new state.
    #[serde(default = "default_expected_fields")]
    pub expected_fields: Vec<String>,
    #[serde(default)]
    pub arguments: ArgumentSchema,
    /// Arguments forming the coordinates, in path order.
    pub coordinates: Vec<String>,
    /// Argument name → dotted path in the request body.
    #[serde(default)]
    pub body: IndexMap<String, String>,
    /// Constant members of every request body.
    #[serde(default)]
    pub fixed_body: Value,
    #[serde(default)]
    pub output: Formatter,
}

fn default_true() -> bool {
    true
}

fn default_expected_fields() -> Vec<String> {
    vec!["id".to_string()]
}

impl ResourceDescriptor {
    /// Body paths fed by `no_log` arguments.
    pub fn no_log_paths(&self) -> Vec<&str> {
        self.body
            .iter()
            .filter(|(argument, _)| self.arguments.get(argument).map_or(false, |spec| spec.no_log))
            .map(|(_, path)| path.as_str())
            .collect()
    }

    /// Structural problems with the descriptor, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for placeholder in self.collection.placeholders() {
            if placeholder != SUBSCRIPTION_PLACEHOLDER
                && !self.coordinates.iter().any(|c| c == placeholder)
            {
                problems.push(format!(
                    "path placeholder '{}' is not a coordinate",
                    placeholder
                ));
            }
        }
        for coordinate in &self.coordinates {
            if !self.arguments.contains(coordinate) {
                problems.push(format!("coordinate '{}' is not an argument", coordinate));
            }
        }
        for argument in self.body.keys() {
            if !self.arguments.contains(argument) {
                problems.push(format!("body field '{}' is not an argument", argument));
            }
        }
        if !(self.fixed_body.is_null() || self.fixed_body.is_object()) {
            problems.push("fixed_body must be a mapping".to_string());
        }
        problems
    }
}

/// What the engine decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::NoOp => "no-op",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// States of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Read,
    Decide,
    Mutate,
    Confirm,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Read => "read",
            Phase::Decide => "decide",
            Phase::Mutate => "mutate",
            Phase::Confirm => "confirm",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}
