//! Declarative argument schemas.
//!
//! A schema is an ordered mapping from argument name to [`ArgSpec`]. Specs
//! are plain data: they are written in the catalog YAML or assembled with the
//! builder methods below, and consumed by [`binder::bind`].

pub mod binder;

pub use binder::{bind, BoundArgs};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Semantic type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    Str,
    Int,
    Bool,
    Dict,
    List,
    /// RFC 3339 timestamp, normalised to UTC.
    Datetime,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Str => "str",
            ArgType::Int => "int",
            ArgType::Bool => "bool",
            ArgType::Dict => "dict",
            ArgType::List => "list",
            ArgType::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

/// Specification of one argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgSpec {
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    /// Never echoed, never logged, never returned.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_log: bool,
    /// Element type of a `list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<ArgType>,
    /// Sub-schema of a `dict`, or of each `dict` element of a `list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ArgumentSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArgSpec {
    pub fn new(arg_type: ArgType) -> Self {
        Self {
            arg_type,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn no_log(mut self) -> Self {
        self.no_log = true;
        self
    }

    pub fn with_elements(mut self, elements: ArgType) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn with_options(mut self, options: ArgumentSchema) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered argument schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentSchema(IndexMap<String, ArgSpec>);

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an argument.
    pub fn arg(mut self, name: impl Into<String>, spec: ArgSpec) -> Self {
        self.0.insert(name.into(), spec);
        self
    }

    /// Add an argument unless one with that name is already declared.
    pub fn insert_if_absent(&mut self, name: &str, spec: ArgSpec) {
        if !self.0.contains_key(name) {
            self.0.insert(name.to_string(), spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgSpec> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical name for a key, resolving aliases.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if let Some((name, _)) = self.0.get_key_value(key) {
            return Some(name.as_str());
        }
        self.0
            .iter()
            .find(|(_, spec)| spec.aliases.iter().any(|a| a == key))
            .map(|(name, _)| name.as_str())
    }
}
