//! Shared test utilities for the azrm integration tests.
//!
//! This module provides:
//! - A recording fake of the ARM client with scripted answers
//! - A small catalog describing a generic resource used by the scenarios
//! - Helpers to build contexts and arguments
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{json, Value};

use azrm::arm::{
    ArmClient, CloudError, CloudResult, Collection, Coordinates, ItemStream, LroPoller, Response,
};
use azrm::catalog::Catalog;
use azrm::modules::{ModuleContext, ModuleParams, ModuleRegistry};
use azrm::retry::PollPolicy;

// ============================================================================
// Recorded calls
// ============================================================================

/// One call the engine made against the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: &'static str,
    pub path: String,
    pub coordinates: Coordinates,
    pub body: Option<Value>,
}

/// How mutations answer.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Answer synchronously with this value (or echo the body when `None`).
    Immediate(Option<Value>),
    /// Hand back an operation that reports done after this many refreshes.
    AfterPolls(u32, Value),
    /// Hand back an operation that never finishes.
    Never,
    /// Reject the call outright.
    Reject(CloudError),
}

// ============================================================================
// Fake ARM client
// ============================================================================

/// A fake ARM client that records every call.
///
/// `get` answers come from a script; once the script runs dry the last
/// answer repeats. `None` in the script means "not found".
pub struct FakeArmClient {
    calls: Mutex<Vec<Call>>,
    gets: Mutex<VecDeque<Option<Value>>>,
    last_get: Mutex<Option<Value>>,
    completion: Mutex<Completion>,
    items: Mutex<Vec<Value>>,
    list_failure: Mutex<Option<(usize, CloudError)>>,
}

impl FakeArmClient {
    /// A client whose resource does not exist.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gets: Mutex::new(VecDeque::new()),
            last_get: Mutex::new(None),
            completion: Mutex::new(Completion::Immediate(None)),
            items: Mutex::new(Vec::new()),
            list_failure: Mutex::new(None),
        }
    }

    /// A client whose resource exists with this representation.
    pub fn with_resource(resource: Value) -> Self {
        Self::new().script_gets(vec![Some(resource)])
    }

    /// Queue `get` answers in order.
    pub fn script_gets(self, answers: Vec<Option<Value>>) -> Self {
        self.gets.lock().extend(answers);
        self
    }

    pub fn completing(self, completion: Completion) -> Self {
        *self.completion.lock() = completion;
        self
    }

    /// Items every `list` call yields.
    pub fn listing(self, items: Vec<Value>) -> Self {
        *self.items.lock() = items;
        self
    }

    /// Fail the listing after `after` items.
    pub fn failing_list_after(self, after: usize, error: CloudError) -> Self {
        *self.list_failure.lock() = Some((after, error));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Calls other than reads.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !matches!(c.operation, "get" | "list"))
            .cloned()
            .collect()
    }

    fn record(
        &self,
        operation: &'static str,
        collection: &Collection,
        coords: &Coordinates,
        body: Option<&Value>,
    ) {
        self.calls.lock().push(Call {
            operation,
            path: collection.path.clone(),
            coordinates: coords.clone(),
            body: body.cloned(),
        });
    }

    fn mutation_response(&self, body: Option<&Value>) -> CloudResult<Response> {
        match self.completion.lock().clone() {
            Completion::Immediate(Some(value)) => Ok(Response::done(value)),
            Completion::Immediate(None) => Ok(Response::done(
                body.cloned().unwrap_or_else(|| json!({})),
            )),
            Completion::AfterPolls(polls, value) => Ok(Response::pending(FakePoller {
                remaining: polls,
                value,
            })),
            Completion::Never => Ok(Response::pending(FakePoller {
                remaining: u32::MAX,
                value: Value::Null,
            })),
            Completion::Reject(error) => Err(error),
        }
    }
}

impl Default for FakeArmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArmClient for FakeArmClient {
    async fn get(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Value> {
        self.record("get", collection, coords, None);
        let answer = match self.gets.lock().pop_front() {
            Some(answer) => {
                *self.last_get.lock() = answer.clone();
                answer
            }
            None => self.last_get.lock().clone(),
        };
        answer.ok_or_else(|| CloudError::not_found(format!("{} not found", coords)))
    }

    async fn create_or_update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.record("create_or_update", collection, coords, Some(body));
        self.mutation_response(Some(body))
    }

    async fn create(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.record("create", collection, coords, Some(body));
        self.mutation_response(Some(body))
    }

    async fn update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.record("update", collection, coords, Some(body));
        self.mutation_response(Some(body))
    }

    async fn delete(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Response> {
        self.record("delete", collection, coords, None);
        self.mutation_response(None)
    }

    async fn list(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<ItemStream> {
        self.record("list", collection, coords, None);
        let mut results: Vec<CloudResult<Value>> =
            self.items.lock().iter().cloned().map(Ok).collect();
        if let Some((after, error)) = self.list_failure.lock().clone() {
            results.truncate(after);
            results.push(Err(error));
        }
        Ok(Box::pin(stream::iter(results)))
    }
}

/// Operation that reports done after a fixed number of refreshes.
struct FakePoller {
    remaining: u32,
    value: Value,
}

#[async_trait]
impl LroPoller for FakePoller {
    async fn is_done(&mut self) -> CloudResult<bool> {
        if self.remaining == 0 {
            return Ok(true);
        }
        self.remaining = self.remaining.saturating_sub(1);
        Ok(false)
    }

    async fn result(&mut self) -> CloudResult<Value> {
        Ok(self.value.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Catalog with one generic resource (`test_item`) and its facts module.
pub const ITEM_CATALOG: &str = r#"
resources:
  - name: test_item
    description: Generic resource used by the scenarios
    kind: item
    collection:
      path: /subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Test.Provider/items/{name}
      api_version: "2024-01-01"
    supports_tags: false
    arguments:
      resource_group: {type: str, required: true}
      name: {type: str, required: true}
      sku: {type: str}
      secret:
        type: str
        no_log: true
    coordinates: [resource_group, name]
    body:
      sku: sku
      secret: properties.secret
    output:
      - id

facts:
  - name: test_item_info
    kind: items
    arguments:
      resource_group: {type: str}
      name: {type: str}
    get:
      collection:
        path: /subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Test.Provider/items/{name}
        api_version: "2024-01-01"
      requires: [resource_group, name]
    lists:
      - name: list_by_resource_group
        collection:
          path: /subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Test.Provider/items
          api_version: "2024-01-01"
        requires: [resource_group]
      - name: list
        collection:
          path: /subscriptions/{subscription_id}/providers/Test.Provider/items
          api_version: "2024-01-01"
        requires: []
    supports_top: true
    output:
      - id
      - name
      - tags
"#;

pub const ITEM_ID: &str =
    "/subscriptions/sub/resourceGroups/rg1/providers/Test.Provider/items/item1";

/// Registry holding the built-in modules plus `test_item`.
pub fn registry() -> ModuleRegistry {
    let mut catalog = Catalog::builtin().unwrap();
    catalog.extend(Catalog::from_yaml(ITEM_CATALOG, "tests").unwrap());
    ModuleRegistry::from_catalog(&catalog)
}

/// Context over `client` with short polling ceilings.
pub fn context(client: Arc<FakeArmClient>) -> ModuleContext {
    ModuleContext::new(client)
        .with_polling(PollPolicy::constant(5, Duration::from_millis(10)))
        .with_delete_confirmation(PollPolicy::constant(5, Duration::from_millis(10)))
}

/// Arguments from a JSON object literal.
pub fn params(value: Value) -> ModuleParams {
    match value {
        Value::Object(map) => map,
        other => panic!("arguments must be an object, got {}", other),
    }
}
