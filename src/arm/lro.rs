//! Uniform handling of long-running operations.
//!
//! ARM answers some mutations immediately and others with an operation that
//! must be polled. [`await_completion`] accepts either shape and yields the
//! final value, so nothing above this module branches on which one the
//! client produced.

use super::{CloudError, CloudResult, Coordinates};
use crate::modules::{ModuleError, ModuleResult};
use crate::retry::{PollOutcome, PollPolicy, Probe};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handle to a server-side operation that completes asynchronously.
#[async_trait]
pub trait LroPoller: Send {
    /// Refresh the operation status and report whether it is terminal.
    ///
    /// A failed or cancelled operation is reported as an error.
    async fn is_done(&mut self) -> CloudResult<bool>;

    /// The final value. Only meaningful once [`is_done`](Self::is_done)
    /// returned `true`.
    async fn result(&mut self) -> CloudResult<Value>;

    /// Server-suggested delay before the next status refresh.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// What a mutating client call hands back.
pub enum Response {
    /// The call completed synchronously with this value.
    Done(Value),
    /// The call started an operation that has to be polled.
    Pending(Box<dyn LroPoller>),
}

impl Response {
    pub fn done(value: Value) -> Self {
        Self::Done(value)
    }

    pub fn pending(poller: impl LroPoller + 'static) -> Self {
        Self::Pending(Box::new(poller))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Resolve a response to its final value.
///
/// Pending operations are polled under `policy`; a cloud fault reported
/// mid-poll becomes a cloud failure for `operation`, and running out of
/// attempts or time becomes a transient failure.
pub async fn await_completion(
    response: Response,
    policy: &PollPolicy,
    operation: &str,
    coords: &Coordinates,
) -> ModuleResult<Value> {
    let poller = match response {
        Response::Done(value) => return Ok(value),
        Response::Pending(poller) => Mutex::new(poller),
    };

    debug!("Waiting for {} on {} to complete", operation, coords);

    let outcome = policy
        .poll_until(|_| {
            let poller = &poller;
            async move {
                let mut poller = poller.lock().await;
                if poller.is_done().await? {
                    Ok::<_, CloudError>(Probe::Ready(()))
                } else {
                    Ok(Probe::Pending {
                        retry_after: poller.retry_after(),
                    })
                }
            }
        })
        .await
        .map_err(|e| ModuleError::cloud(operation, coords, e))?;

    match outcome {
        PollOutcome::Ready(()) => poller
            .into_inner()
            .result()
            .await
            .map_err(|e| ModuleError::cloud(operation, coords, e)),
        PollOutcome::Exhausted { attempts, elapsed } => {
            warn!(
                "{} on {} still running after {} polls ({:?})",
                operation, coords, attempts, elapsed
            );
            Err(ModuleError::transient(
                operation,
                format!(
                    "long-running operation did not complete after {} polls ({}s)",
                    attempts,
                    elapsed.as_secs()
                ),
            ))
        }
    }
}
