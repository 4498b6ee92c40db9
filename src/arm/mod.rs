//! Access to the Azure Resource Manager control plane.
//!
//! The rest of the crate talks to ARM exclusively through the [`ArmClient`]
//! capability: a narrow, collection-oriented interface offering `get`,
//! `create_or_update`, `create`, `update`, `delete` and `list`. Mutating
//! calls may answer with an already-resolved value or with a long-running
//! operation handle (see [`lro`]).
//!
//! - [`gateway::Gateway`] normalizes a client for one collection, turning
//!   "not found" into absence and every other failure into a
//!   [`ModuleError`](crate::modules::ModuleError).
//! - [`rest::RestClient`] implements the capability over HTTPS.
//! - [`environment::CloudEnvironment`] resolves the ARM endpoint of a cloud.

pub mod environment;
pub mod gateway;
pub mod lro;
pub mod rest;

pub use environment::CloudEnvironment;
pub use gateway::Gateway;
pub use lro::{await_completion, LroPoller, Response};
pub use rest::RestClient;

use async_trait::async_trait;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Placeholder syntax used in collection path templates: `{resource_group}`.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Placeholder filled in by the client rather than from coordinates.
pub const SUBSCRIPTION_PLACEHOLDER: &str = "subscription_id";

/// Result type for raw client calls.
pub type CloudResult<T> = Result<T, CloudError>;

/// Lazily paged sequence of raw resource representations.
pub type ItemStream = BoxStream<'static, CloudResult<Value>>;

/// Broad classification of a cloud-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    /// Network, TLS or authentication failure before ARM answered.
    Transport,
    /// ARM answered with an error.
    Service,
    /// The client has no implementation for the requested operation.
    Unsupported,
}

/// Error raised by an [`ArmClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct CloudError {
    /// Failure class.
    pub kind: CloudErrorKind,
    /// HTTP status, when ARM answered.
    pub status: Option<u16>,
    /// ARM error code (e.g. `ResourceNotFound`).
    pub code: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl CloudError {
    /// A "resource does not exist" answer.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: CloudErrorKind::NotFound,
            status: Some(404),
            code: Some("ResourceNotFound".to_string()),
            message: message.into(),
        }
    }

    /// A failure that happened before ARM produced an answer.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: CloudErrorKind::Transport,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// An error answer from ARM.
    pub fn service(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        let kind = if status == Some(404) {
            CloudErrorKind::NotFound
        } else {
            CloudErrorKind::Service
        };
        Self {
            kind,
            status,
            code,
            message: message.into(),
        }
    }

    /// The client does not implement an operation.
    pub fn unsupported(operation: &str) -> Self {
        Self {
            kind: CloudErrorKind::Unsupported,
            status: None,
            code: None,
            message: format!("operation '{}' is not provided by this client", operation),
        }
    }

    /// Whether ARM reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == CloudErrorKind::NotFound
    }

    fn describe(&self) -> String {
        let message = single_line(&self.message);
        match (&self.code, self.status) {
            (Some(code), Some(status)) => format!("{} ({}): {}", code, status, message),
            (Some(code), None) => format!("{}: {}", code, message),
            (None, Some(status)) => format!("HTTP {}: {}", status, message),
            (None, None) => message,
        }
    }
}

/// Collapse all whitespace runs (including newlines) into single spaces.
pub(crate) fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A resource collection addressed by a path template.
///
/// Templates name their variable segments with placeholders, for example
/// `/subscriptions/{subscription_id}/resourceGroups/{resource_group}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Path template relative to the ARM endpoint.
    pub path: String,
    /// `api-version` query value for every call on this collection.
    pub api_version: String,
}

impl Collection {
    pub fn new(path: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            api_version: api_version.into(),
        }
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.path)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Split the template into path segments with placeholders substituted.
    ///
    /// Values are returned raw; callers are responsible for encoding.
    pub fn segments<'v, F>(&self, lookup: F) -> CloudResult<Vec<String>>
    where
        F: Fn(&str) -> Option<&'v str>,
    {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                let mut missing = None;
                let rendered = PLACEHOLDER.replace_all(segment, |caps: &regex::Captures<'_>| {
                    let name = &caps[1];
                    match lookup(name) {
                        Some(value) => value.to_string(),
                        None => {
                            missing = Some(name.to_string());
                            String::new()
                        }
                    }
                });
                match missing {
                    Some(name) => Err(CloudError::transport(format!(
                        "no value for '{}' in collection path '{}'",
                        name, self.path
                    ))),
                    None => Ok(rendered.into_owned()),
                }
            })
            .collect()
    }
}

/// Ordered identifiers locating one resource inside ARM.
///
/// For a SQL firewall rule this is `(resource_group, server_name, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinates(IndexMap<String, String>);

impl Coordinates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a coordinate, keeping insertion order.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// The operations the engine requires from an ARM SDK.
///
/// Implementations are free to resolve mutations synchronously
/// ([`Response::Done`]) or to hand back a long-running operation handle
/// ([`Response::Pending`]); callers never branch on which.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArmClient: Send + Sync {
    /// Fetch one resource. A missing resource is an error with
    /// [`CloudErrorKind::NotFound`].
    async fn get(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Value>;

    /// Create the resource or replace its definition.
    async fn create_or_update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response>;

    /// Create a resource that has a distinct update operation.
    async fn create(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        let _ = (collection, coords, body);
        Err(CloudError::unsupported("create"))
    }

    /// Partially update an existing resource.
    async fn update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        let _ = (collection, coords, body);
        Err(CloudError::unsupported("update"))
    }

    /// Delete the resource.
    async fn delete(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Response>;

    /// Enumerate a collection. Pages are fetched as the stream is consumed.
    async fn list(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<ItemStream>;
}
