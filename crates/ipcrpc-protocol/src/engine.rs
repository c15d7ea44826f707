use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::context::CallContext;
use crate::error::RpcError;
use crate::message::{create_error_response, create_request, create_response, RequestId, RpcMessage};
use crate::pending::{CallError, Delivery, PendingCalls};

/// Default time an outbound call waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves and invokes the handler for an inbound call.
///
/// Implemented by the router; the engine only knows this seam.
#[async_trait(?Send)]
pub trait Dispatch {
    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CallContext,
    ) -> Result<Value, RpcError>;
}

/// JSON-RPC engine: turns inbound envelopes into dispatches and responses,
/// and correlates responses with outbound calls.
pub struct ProtocolEngine {
    dispatcher: Rc<dyn Dispatch>,
    pending: PendingCalls,
    request_timeout: Duration,
}

impl ProtocolEngine {
    pub fn new(dispatcher: Rc<dyn Dispatch>) -> Self {
        Self {
            dispatcher,
            pending: PendingCalls::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the default outbound call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The outbound call table.
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Process raw JSON text. Returns the serialized reply, if one is owed.
    pub async fn process_message(&self, raw: &str, ctx: &CallContext) -> Option<String> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.process_value(value, ctx).await,
            Err(err) => {
                warn!(peer_id = ?ctx.peer_id, error = %err, "JSON parse error");
                Some(create_error_response(None, &RpcError::parse_error()))
            }
        }
    }

    /// Process an already parsed envelope.
    ///
    /// Requests always get a reply; notifications and responses never do.
    pub async fn process_value(&self, value: Value, ctx: &CallContext) -> Option<String> {
        let message = match RpcMessage::from_value(value) {
            Ok(message) => message,
            Err(invalid) => {
                debug!(
                    peer_id = ?ctx.peer_id,
                    code = invalid.error.code.code(),
                    "rejected malformed message"
                );
                return invalid
                    .reply
                    .then(|| create_error_response(invalid.id.as_ref(), &invalid.error));
            }
        };

        match message {
            RpcMessage::Request { id, method, params } => {
                let outcome = AssertUnwindSafe(self.dispatcher.dispatch(&method, params, ctx))
                    .catch_unwind()
                    .await;
                Some(match outcome {
                    Ok(Ok(result)) => create_response(&id, result),
                    Ok(Err(err)) => create_error_response(Some(&id), &err),
                    Err(_) => {
                        error!(peer_id = ?ctx.peer_id, %method, "dispatch panicked");
                        create_error_response(Some(&id), &RpcError::internal("Internal error"))
                    }
                })
            }
            RpcMessage::Notification { method, params } => {
                let outcome = AssertUnwindSafe(self.dispatcher.dispatch(&method, params, ctx))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        debug!(peer_id = ?ctx.peer_id, %method, error = %err, "notification failed");
                    }
                    Err(_) => {
                        error!(peer_id = ?ctx.peer_id, %method, "notification handler panicked");
                    }
                }
                None
            }
            RpcMessage::Response { id, result } => {
                self.deliver(&id, Ok(result), ctx);
                None
            }
            RpcMessage::Error {
                id: Some(id),
                error,
            } => {
                self.deliver(&id, Err(CallError::Remote(error)), ctx);
                None
            }
            RpcMessage::Error { id: None, error } => {
                warn!(
                    peer_id = ?ctx.peer_id,
                    code = error.code.code(),
                    message = %error.message,
                    "peer reported an error without a request id"
                );
                None
            }
        }
    }

    fn deliver(&self, id: &RequestId, outcome: Result<Value, CallError>, ctx: &CallContext) {
        match self.pending.resolve(id, ctx.peer_id.as_deref(), outcome) {
            Delivery::Resolved => debug!(%id, "resolved pending call"),
            Delivery::Unknown => {
                warn!(peer_id = ?ctx.peer_id, %id, "received response for unknown request");
            }
            Delivery::WrongPeer => {
                warn!(peer_id = ?ctx.peer_id, %id, "received response from a peer the request was not sent to");
            }
        }
    }

    /// Issue a request and wait for its response.
    ///
    /// `send` writes the serialized request to the transport. The pending
    /// entry is removed whether the call succeeds, fails, times out, or the
    /// returned future is dropped.
    pub async fn call_method<F, Fut, E>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
        peer: Option<&str>,
        send: F,
    ) -> Result<Value, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<CallError>,
    {
        let timeout = timeout.unwrap_or(self.request_timeout);
        let id = RequestId::generate();
        let call = self
            .pending
            .register(id.clone(), peer.map(str::to_owned), timeout)
            .ok_or_else(|| CallError::Cancelled(format!("request id {id} already pending")))?;

        debug!(%method, %id, ?timeout, "sending request");
        send(create_request(method, params, Some(id))).await?;
        Ok(call.wait().await?)
    }

    /// Cancel every outstanding outbound call.
    pub fn cancel_all(&self) -> usize {
        self.pending.cancel_all("protocol engine shut down")
    }
}
