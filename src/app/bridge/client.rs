//! Native sandbox-side bridge client
//!
//! Mirrors the injected `fetchData` script for sandboxes that run Rust instead of a browser
//! engine (the in-process surface, headless hosts, tests). Each call gets a fresh correlation
//! id and a one-shot waiter with a bounded wait. The waiter is deregistered when the call
//! ends, whether it settles, times out or is dropped, so a late response never settles it.

#![warn(clippy::all, rust_2018_idioms)]

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::message::{response_outcome, BridgeMessage};
use super::BRIDGE_TIMEOUT;

/// Why a `fetch_data` call did not produce a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No response arrived within the bridge timeout
    Timeout { url: String, after: Duration },
    /// The host answered with a fault message
    Fault(String),
    /// The context was torn down or the host side is gone
    Disconnected,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Timeout { url, after } => {
                write!(f, "API request timeout after {}s: {}", after.as_secs(), url)
            }
            BridgeError::Fault(message) => f.write_str(message),
            BridgeError::Disconnected => write!(f, "Sandbox bridge disconnected"),
        }
    }
}

impl std::error::Error for BridgeError {}

type Waiter = oneshot::Sender<Result<Value, String>>;

/// Removes a call's waiter when the call ends, however it ends
struct PendingRegistration<'a> {
    client: &'a BridgeClient,
    request_id: &'a str,
}

impl Drop for PendingRegistration<'_> {
    fn drop(&mut self) {
        self.client.lock_pending().remove(self.request_id);
    }
}

/// Sandbox end of the bridge
pub struct BridgeClient {
    outbound: mpsc::UnboundedSender<BridgeMessage>,
    pending: Mutex<HashMap<String, Waiter>>,
    timeout: Duration,
}

impl BridgeClient {
    pub fn new(outbound: mpsc::UnboundedSender<BridgeMessage>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Client plus the receiver the host reads sandbox messages from
    pub fn channel(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<BridgeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, timeout), rx)
    }

    pub fn with_default_timeout() -> (Self, mpsc::UnboundedReceiver<BridgeMessage>) {
        Self::channel(BRIDGE_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The sandbox's single data-access call
    ///
    /// Dropping the returned future before it settles deregisters its waiter.
    pub async fn fetch_data(&self, url: &str) -> Result<Value, BridgeError> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(request_id.clone(), tx);
        let _registration = PendingRegistration {
            client: self,
            request_id: &request_id,
        };

        let request = BridgeMessage::ApiRequest {
            request_id: request_id.clone(),
            url: url.to_string(),
        };
        if self.outbound.send(request).is_err() {
            return Err(BridgeError::Disconnected);
        }
        trace_debug!("Bridge request {} -> {}", request_id, url);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(message))) => Err(BridgeError::Fault(message)),
            Ok(Err(_)) => Err(BridgeError::Disconnected),
            Err(_) => {
                trace_warn!("Bridge request {} timed out: {}", request_id, url);
                Err(BridgeError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Hand a host message to its waiter
    ///
    /// Returns true when a waiter with the matching correlation id was settled. Responses
    /// for unknown, timed-out or already settled ids are dropped.
    pub fn deliver(&self, message: BridgeMessage) -> bool {
        let BridgeMessage::ApiResponse {
            request_id,
            data,
            error,
        } = message
        else {
            trace_debug!("Sandbox ignoring non-response message");
            return false;
        };

        let Some(waiter) = self.lock_pending().remove(&request_id) else {
            trace_debug!("No waiter for bridge response {}", request_id);
            return false;
        };
        waiter.send(response_outcome(data, error)).is_ok()
    }

    /// Forward a runtime fault to the host
    pub fn report_fault(&self, message: impl Into<String>, stack: Option<String>) -> bool {
        self.outbound
            .send(BridgeMessage::SandboxFault {
                message: message.into(),
                stack,
            })
            .is_ok()
    }

    pub fn pending_requests(&self) -> usize {
        self.lock_pending().len()
    }

    /// Drop every waiter; their calls settle with [`BridgeError::Disconnected`]
    pub fn close(&self) {
        let dropped = {
            let mut pending = self.lock_pending();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            trace_debug!("Bridge closed with {} requests in flight", dropped);
        }
    }
}
