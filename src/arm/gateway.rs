//! Normalized handle to one ARM resource collection.

use super::{ArmClient, Collection, Coordinates, ItemStream, Response, SUBSCRIPTION_PLACEHOLDER};
use crate::modules::{ModuleError, ModuleResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Gateway over a single collection.
///
/// "Not found" on `get` is the absent sentinel (`None`), never a failure.
/// Every other client error is mapped to a [`ModuleError`] annotated with
/// the operation and the coordinates.
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn ArmClient>,
    collection: Collection,
}

impl Gateway {
    pub fn new(client: Arc<dyn ArmClient>, collection: Collection) -> Self {
        Self { client, collection }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Fetch the observed state, or `None` when the resource does not exist.
    pub async fn get(&self, coords: &Coordinates) -> ModuleResult<Option<Value>> {
        self.ensure_addressable(coords)?;
        debug!("get {}", coords);
        match self.client.get(&self.collection, coords).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                trace!("{} is absent", coords);
                Ok(None)
            }
            Err(e) => Err(ModuleError::cloud("get", coords, e)),
        }
    }

    pub async fn create_or_update(
        &self,
        coords: &Coordinates,
        body: &Value,
    ) -> ModuleResult<Response> {
        self.ensure_addressable(coords)?;
        debug!("create_or_update {}", coords);
        self.client
            .create_or_update(&self.collection, coords, body)
            .await
            .map_err(|e| ModuleError::cloud("create_or_update", coords, e))
    }

    pub async fn create(&self, coords: &Coordinates, body: &Value) -> ModuleResult<Response> {
        self.ensure_addressable(coords)?;
        debug!("create {}", coords);
        self.client
            .create(&self.collection, coords, body)
            .await
            .map_err(|e| ModuleError::cloud("create", coords, e))
    }

    pub async fn update(&self, coords: &Coordinates, body: &Value) -> ModuleResult<Response> {
        self.ensure_addressable(coords)?;
        debug!("update {}", coords);
        self.client
            .update(&self.collection, coords, body)
            .await
            .map_err(|e| ModuleError::cloud("update", coords, e))
    }

    pub async fn delete(&self, coords: &Coordinates) -> ModuleResult<Response> {
        self.ensure_addressable(coords)?;
        debug!("delete {}", coords);
        self.client
            .delete(&self.collection, coords)
            .await
            .map_err(|e| ModuleError::cloud("delete", coords, e))
    }

    /// Enumerate the collection. Paging errors surface as stream items.
    pub async fn list(&self, coords: &Coordinates) -> ModuleResult<ItemStream> {
        self.ensure_addressable(coords)?;
        debug!("list {} {}", self.collection.path, coords);
        self.client
            .list(&self.collection, coords)
            .await
            .map_err(|e| ModuleError::cloud("list", coords, e))
    }

    /// Every placeholder except the subscription must be filled before the
    /// client is called.
    fn ensure_addressable(&self, coords: &Coordinates) -> ModuleResult<()> {
        let missing: Vec<&str> = self
            .collection
            .placeholders()
            .into_iter()
            .filter(|p| *p != SUBSCRIPTION_PLACEHOLDER)
            .filter(|p| coords.get(p).map_or(true, str::is_empty))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ModuleError::MissingParameter(missing.join(", ")))
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}
