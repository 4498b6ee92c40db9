//! Resource and facts descriptors as data.
//!
//! The built-in catalog is embedded at compile time and parsed once. Users
//! may layer additional catalogs on top; an entry with an existing name
//! replaces the earlier one.

use crate::engine::ResourceDescriptor;
use crate::error::{Error, Result};
use crate::facts::FactsDescriptor;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const BUILTIN_YAML: &str = include_str!("builtin.yaml");

static BUILTIN: Lazy<std::result::Result<Catalog, String>> =
    Lazy::new(|| Catalog::from_yaml(BUILTIN_YAML, "builtin").map_err(|e| e.to_string()));

/// A set of module descriptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Mutating modules.
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    /// Read-only modules.
    #[serde(default)]
    pub facts: Vec<FactsDescriptor>,
}

impl Catalog {
    /// The catalog shipped with azrm.
    pub fn builtin() -> Result<Self> {
        BUILTIN
            .as_ref()
            .map(Clone::clone)
            .map_err(|message| Error::catalog("builtin", message.clone()))
    }

    /// Parse and validate a catalog document.
    pub fn from_yaml(text: &str, source_name: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(text)
            .map_err(|e| Error::catalog(source_name, e.to_string()))?;
        catalog.validate(source_name)?;
        Ok(catalog)
    }

    /// Load a user catalog from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text, &path.display().to_string())
    }

    /// Layer `other` over this catalog.
    pub fn extend(&mut self, other: Catalog) {
        for descriptor in other.resources {
            debug!("Catalog entry {} loaded", descriptor.name);
            match self.resources.iter_mut().find(|d| d.name == descriptor.name) {
                Some(existing) => *existing = descriptor,
                None => self.resources.push(descriptor),
            }
        }
        for descriptor in other.facts {
            debug!("Catalog entry {} loaded", descriptor.name);
            match self.facts.iter_mut().find(|d| d.name == descriptor.name) {
                Some(existing) => *existing = descriptor,
                None => self.facts.push(descriptor),
            }
        }
    }

    /// Reject duplicate names and structurally broken descriptors.
    pub fn validate(&self, source_name: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut problems = Vec::new();

        let names = self
            .resources
            .iter()
            .map(|d| d.name.as_str())
            .chain(self.facts.iter().map(|d| d.name.as_str()));
        for name in names {
            if !seen.insert(name) {
                problems.push(format!("duplicate module '{}'", name));
            }
        }
        for descriptor in &self.resources {
            problems.extend(
                descriptor
                    .problems()
                    .into_iter()
                    .map(|p| format!("{}: {}", descriptor.name, p)),
            );
        }
        for descriptor in &self.facts {
            problems.extend(
                descriptor
                    .problems()
                    .into_iter()
                    .map(|p| format!("{}: {}", descriptor.name, p)),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::catalog(source_name, problems.join("; ")))
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len() + self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
