//! [`ArmClient`] over the ARM REST API.
//!
//! Requests are addressed as `endpoint + collection path + ?api-version=`.
//! Mutations that answer `201`/`202` with an `Azure-AsyncOperation` or
//! `Location` header become [`RestPoller`] handles; everything else resolves
//! immediately.

use super::{
    ArmClient, CloudError, CloudResult, Collection, Coordinates, ItemStream, LroPoller, Response,
    SUBSCRIPTION_PLACEHOLDER,
};
use crate::redact::SensitiveString;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, AUTHORIZATION, LOCATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

const ASYNC_OPERATION: &str = "azure-asyncoperation";
const REQUEST_ID: &str = "x-ms-client-request-id";

/// HTTPS client for one subscription.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoint: Url,
    subscription_id: String,
    token: SensitiveString,
}

impl RestClient {
    pub fn new(
        endpoint: Url,
        subscription_id: impl Into<String>,
        token: SensitiveString,
        timeout: Duration,
        user_agent: &str,
    ) -> CloudResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CloudError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint,
            subscription_id: subscription_id.into(),
            token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Absolute URL of a collection (or of one resource inside it).
    pub fn url_for(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Url> {
        let segments = collection.segments(|name| match name {
            SUBSCRIPTION_PLACEHOLDER => Some(self.subscription_id.as_str()),
            other => coords.get(other),
        })?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CloudError::transport(format!("invalid endpoint '{}'", self.endpoint)))?
            .pop_if_empty()
            .extend(segments.iter().map(String::as_str));
        url.query_pairs_mut()
            .append_pair("api-version", &collection.api_version);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> CloudResult<reqwest::Response> {
        let request_id = Uuid::new_v4().to_string();
        debug!("{} {} ({})", method, url.path(), request_id);

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token.expose()))
            .header(REQUEST_ID, request_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| CloudError::transport(e.to_string()))
    }

    async fn get_json(&self, url: Url) -> CloudResult<Value> {
        let response = self.send(Method::GET, url, None).await?;
        if response.status().is_success() {
            read_json(response).await
        } else {
            Err(error_from(response).await)
        }
    }

    /// PUT or PATCH a resource.
    async fn write(
        &self,
        method: Method,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        let url = self.url_for(collection, coords)?;
        let response = self.send(method, url.clone(), Some(body)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from(response).await);
        }

        if let Some(poller) = self.poller_for(&response, Some(url)) {
            return Ok(Response::pending(poller));
        }
        Ok(Response::done(read_json(response).await?))
    }

    fn poller_for(&self, response: &reqwest::Response, final_url: Option<Url>) -> Option<RestPoller> {
        if !matches!(response.status(), StatusCode::CREATED | StatusCode::ACCEPTED) {
            return None;
        }
        let headers = response.headers();
        let (monitor, mode) = match header_url(headers, ASYNC_OPERATION) {
            Some(url) => (url, MonitorMode::AsyncOperation),
            None => (header_url(headers, LOCATION.as_str())?, MonitorMode::Location),
        };
        trace!("Long-running operation monitored at {}", monitor);
        Some(RestPoller {
            client: self.clone(),
            monitor,
            mode,
            final_url,
            retry_after: retry_after(headers),
            last_body: None,
        })
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("subscription_id", &self.subscription_id)
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl ArmClient for RestClient {
    async fn get(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Value> {
        let url = self.url_for(collection, coords)?;
        self.get_json(url).await
    }

    async fn create_or_update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.write(Method::PUT, collection, coords, body).await
    }

    async fn create(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.write(Method::PUT, collection, coords, body).await
    }

    async fn update(
        &self,
        collection: &Collection,
        coords: &Coordinates,
        body: &Value,
    ) -> CloudResult<Response> {
        self.write(Method::PATCH, collection, coords, body).await
    }

    async fn delete(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<Response> {
        let url = self.url_for(collection, coords)?;
        let response = self.send(Method::DELETE, url, None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Response::done(Value::Null));
        }
        if !status.is_success() {
            return Err(error_from(response).await);
        }
        if let Some(poller) = self.poller_for(&response, None) {
            return Ok(Response::pending(poller));
        }
        Ok(Response::done(Value::Null))
    }

    async fn list(&self, collection: &Collection, coords: &Coordinates) -> CloudResult<ItemStream> {
        let first = self.url_for(collection, coords)?;
        let client = self.clone();

        let pages = stream::try_unfold(Some(first), move |next| {
            let client = client.clone();
            async move {
                let url = match next {
                    Some(url) => url,
                    None => return Ok::<_, CloudError>(None),
                };
                let page = client.get_json(url).await?;
                let items = page
                    .get("value")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let next = match page.get("nextLink").and_then(Value::as_str) {
                    Some(link) if !link.is_empty() => Some(Url::parse(link).map_err(|e| {
                        CloudError::transport(format!("invalid nextLink '{}': {}", link, e))
                    })?),
                    _ => None,
                };
                trace!("Fetched page with {} items", items.len());
                Ok(Some((items, next)))
            }
        });

        Ok(pages
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, CloudError>)))
            .try_flatten()
            .boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorMode {
    /// `Azure-AsyncOperation`: the monitor answers `{"status": ...}`.
    AsyncOperation,
    /// `Location`: `202` while running, the final body once done.
    Location,
}

/// Polls an ARM operation-status URL.
pub struct RestPoller {
    client: RestClient,
    monitor: Url,
    mode: MonitorMode,
    final_url: Option<Url>,
    retry_after: Option<Duration>,
    last_body: Option<Value>,
}

#[async_trait]
impl LroPoller for RestPoller {
    async fn is_done(&mut self) -> CloudResult<bool> {
        let response = self
            .client
            .send(Method::GET, self.monitor.clone(), None)
            .await?;
        self.retry_after = retry_after(response.headers());
        let status = response.status();

        match self.mode {
            MonitorMode::AsyncOperation => {
                if !status.is_success() {
                    return Err(error_from(response).await);
                }
                let body = read_json(response).await?;
                match body.get("status").and_then(Value::as_str).unwrap_or("") {
                    "Succeeded" => Ok(true),
                    "Failed" | "Canceled" | "Cancelled" => Err(operation_error(&body)),
                    other => {
                        trace!("Operation status: {}", other);
                        Ok(false)
                    }
                }
            }
            MonitorMode::Location => match status {
                StatusCode::ACCEPTED => Ok(false),
                s if s.is_success() => {
                    self.last_body = Some(read_json(response).await?);
                    Ok(true)
                }
                _ => Err(error_from(response).await),
            },
        }
    }

    async fn result(&mut self) -> CloudResult<Value> {
        match (&self.final_url, self.last_body.take()) {
            (Some(url), _) => self.client.get_json(url.clone()).await,
            (None, Some(body)) => Ok(body),
            (None, None) => Ok(Value::Null),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

fn header_url(headers: &HeaderMap, name: &str) -> Option<Url> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn read_json(response: reqwest::Response) -> CloudResult<Value> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| CloudError::transport(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| {
        CloudError::service(Some(status), None, format!("malformed response body: {}", e))
    })
}

/// Build a [`CloudError`] from an ARM error response.
async fn error_from(response: reqwest::Response) -> CloudError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let error = body.get("error").unwrap_or(&body);

    let code = error
        .get("code")
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| (!text.trim().is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    CloudError::service(Some(status.as_u16()), code, message)
}

fn operation_error(body: &Value) -> CloudError {
    let error = body.get("error").unwrap_or(&Value::Null);
    let status = body.get("status").and_then(Value::as_str).unwrap_or("Failed");
    CloudError::service(
        None,
        error
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(status.to_string())),
        error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("long-running operation did not succeed")
            .to_string(),
    )
}
