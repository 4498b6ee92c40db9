//! Read-only fan-out over ARM collections.
//!
//! A facts module picks exactly one operation per invocation from the
//! arguments the caller set:
//!
//! - `get`, when every argument it requires is set;
//! - an input failure, when an argument only `get` uses (such as `name`) is
//!   set without the rest of `get`'s requirements;
//! - otherwise the list rule whose requirements are all met and which
//!   requires the most arguments (declaration order breaks ties).
//!
//! Listed items pass through the tag filter and the descriptor's formatter.
//! Pages are consumed lazily and reading stops once `top` items are kept.

use crate::arm::{ArmClient, Collection, Coordinates, Gateway, SUBSCRIPTION_PLACEHOLDER};
use crate::engine::desired::TAGS_ARG;
use crate::format::Formatter;
use crate::modules::{ModuleError, ModuleResult, ParamExt};
use crate::redact::NoLogRegistry;
use crate::schema::{ArgumentSchema, BoundArgs};
use crate::tags::{self, TagFilter};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Argument bounding the number of returned items.
pub const TOP_ARG: &str = "top";

/// Fetch a single resource when its identifying arguments are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRule {
    pub collection: Collection,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// One listing operation and the arguments it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRule {
    /// Operation name used in logs and errors, e.g. `list_by_resource_group`.
    pub name: String,
    pub collection: Collection,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Binds one read-only module to a resource kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Key the formatted sequence is published under.
    pub kind: String,
    #[serde(default)]
    pub arguments: ArgumentSchema,
    #[serde(default)]
    pub get: Option<GetRule>,
    #[serde(default)]
    pub lists: Vec<ListRule>,
    #[serde(default)]
    pub supports_top: bool,
    #[serde(default)]
    pub output: Formatter,
}

/// The operation chosen for one invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch<'a> {
    Get(&'a GetRule),
    List(&'a ListRule),
}

impl Dispatch<'_> {
    pub fn operation(&self) -> &str {
        match self {
            Dispatch::Get(_) => "get",
            Dispatch::List(rule) => &rule.name,
        }
    }

    pub fn collection(&self) -> &Collection {
        match self {
            Dispatch::Get(rule) => &rule.collection,
            Dispatch::List(rule) => &rule.collection,
        }
    }
}

impl FactsDescriptor {
    /// Pick the operation for the set arguments.
    pub fn dispatch(&self, args: &BoundArgs) -> ModuleResult<Dispatch<'_>> {
        let satisfied = |requires: &[String]| requires.iter().all(|name| args.is_set(name));

        if let Some(get) = &self.get {
            if satisfied(&get.requires) {
                return Ok(Dispatch::Get(get));
            }

            // An identifying argument no listing accepts would be silently dropped.
            let identifying: Vec<&str> = get
                .requires
                .iter()
                .filter(|name| args.is_set(name))
                .filter(|name| !self.lists.iter().any(|rule| rule.requires.contains(name)))
                .map(String::as_str)
                .collect();
            if !identifying.is_empty() {
                let missing: Vec<&str> = get
                    .requires
                    .iter()
                    .filter(|name| !args.is_set(name))
                    .map(String::as_str)
                    .collect();
                return Err(ModuleError::InvalidArguments(vec![format!(
                    "{} required when filtering by {}",
                    missing.join(", "),
                    identifying.join(", ")
                )]));
            }
        }

        let mut best: Option<&ListRule> = None;
        for rule in self.lists.iter().filter(|rule| satisfied(&rule.requires)) {
            if best.map_or(true, |b| rule.requires.len() > b.requires.len()) {
                best = Some(rule);
            }
        }

        best.map(Dispatch::List).ok_or_else(|| {
            let options: Vec<String> = self
                .lists
                .iter()
                .map(|rule| format!("{} ({})", rule.name, rule.requires.join(", ")))
                .collect();
            ModuleError::InvalidArguments(vec![format!(
                "no listing operation accepts the given arguments; available: {}",
                options.join("; ")
            )])
        })
    }

    /// Structural problems with the descriptor, if any.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.get.is_none() && self.lists.is_empty() {
            problems.push("declares neither get nor lists".to_string());
        }

        let mut rules: Vec<(&str, &Collection, &[String])> = Vec::new();
        if let Some(get) = &self.get {
            rules.push(("get", &get.collection, &get.requires));
        }
        for rule in &self.lists {
            rules.push((&rule.name, &rule.collection, &rule.requires));
        }
        for (operation, collection, requires) in rules {
            for placeholder in collection.placeholders() {
                if placeholder != SUBSCRIPTION_PLACEHOLDER && !requires.iter().any(|r| r == placeholder) {
                    problems.push(format!(
                        "{}: path placeholder '{}' is not required",
                        operation, placeholder
                    ));
                }
            }
            for name in requires {
                if !self.arguments.contains(name) {
                    problems.push(format!("{}: '{}' is not an argument", operation, name));
                }
            }
        }
        problems
    }
}

/// Run the dispatched operation and return the formatted items.
pub async fn gather(
    descriptor: &FactsDescriptor,
    args: &BoundArgs,
    client: Arc<dyn ArmClient>,
) -> ModuleResult<Vec<Value>> {
    let dispatch = descriptor.dispatch(args)?;
    let coords = coordinates_for(dispatch.collection(), args)?;
    info!("{} dispatching {} {}", descriptor.name, dispatch.operation(), coords);

    let filters: Vec<TagFilter> = args
        .values()
        .get_vec_string(TAGS_ARG)?
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| entry.parse().ok())
        .collect();
    let top = if descriptor.supports_top {
        args.values().get_u32(TOP_ARG)?.map(|n| n as usize)
    } else {
        None
    };

    let redactor = args.redactor();
    let gateway = Gateway::new(client, dispatch.collection().clone());
    let mut items = Vec::new();

    match dispatch {
        Dispatch::Get(_) => {
            if let Some(item) = gateway.get(&coords).await? {
                if passes(&item, &filters) {
                    items.push(publish(descriptor, &redactor, &item));
                }
            }
        }
        Dispatch::List(_) if top == Some(0) => {}
        Dispatch::List(rule) => {
            let mut stream = gateway.list(&coords).await?;
            while let Some(item) = stream
                .try_next()
                .await
                .map_err(|e| ModuleError::cloud(&rule.name, &coords, e))?
            {
                if passes(&item, &filters) {
                    items.push(publish(descriptor, &redactor, &item));
                }
                if top.map_or(false, |limit| items.len() >= limit) {
                    break;
                }
            }
        }
    }

    debug!("{} returned {} item(s)", descriptor.name, items.len());
    Ok(items)
}

fn coordinates_for(collection: &Collection, args: &BoundArgs) -> ModuleResult<Coordinates> {
    let mut coords = Coordinates::new();
    for placeholder in collection.placeholders() {
        if placeholder == SUBSCRIPTION_PLACEHOLDER {
            continue;
        }
        coords.push(placeholder, args.values().get_string_required(placeholder)?);
    }
    Ok(coords)
}

fn passes(item: &Value, filters: &[TagFilter]) -> bool {
    let observed = item.get("tags").and_then(tags::from_value);
    tags::matches_all(observed.as_ref(), filters)
}

fn publish(descriptor: &FactsDescriptor, redactor: &NoLogRegistry, item: &Value) -> Value {
    redactor.redact_value(&descriptor.output.format(item))
}
