use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ErrorCode, RpcError};
use crate::message::RequestId;

/// Why an outbound call did not produce a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(RpcError),

    /// No response arrived before the deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The call was abandoned locally (shutdown or cleanup).
    #[error("call cancelled: {0}")]
    Cancelled(String),

    /// The connection the call was sent on closed.
    #[error("peer disconnected: {0}")]
    Disconnected(String),
}

impl CallError {
    /// The JSON-RPC code that best describes this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Remote(err) => err.code,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Cancelled(_) => ErrorCode::InternalError,
            Self::Disconnected(_) => ErrorCode::ProcessError,
        }
    }
}

type Outcome = Result<Value, CallError>;

struct Entry {
    seq: u64,
    peer: Option<String>,
    tx: oneshot::Sender<Outcome>,
}

/// Outcome of delivering a response to the pending table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A waiter received the outcome.
    Resolved,
    /// No call with that id is pending.
    Unknown,
    /// A call is pending under that id but was sent to a different peer.
    WrongPeer,
}

/// Table of outbound calls awaiting a response, keyed by request id.
///
/// Cloning shares the table. At most one call is pending per id; the entry is
/// removed when resolved, timed out, cancelled, or when its [`PendingCall`]
/// guard is dropped.
#[derive(Clone, Default)]
pub struct PendingCalls {
    inner: Rc<Table>,
}

#[derive(Default)]
struct Table {
    entries: RefCell<HashMap<RequestId, Entry>>,
    next_seq: Cell<u64>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. Returns `None` if `id` is already pending.
    pub fn register(
        &self,
        id: RequestId,
        peer: Option<String>,
        timeout: Duration,
    ) -> Option<PendingCall> {
        let mut entries = self.inner.entries.borrow_mut();
        if entries.contains_key(&id) {
            return None;
        }
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq.wrapping_add(1));
        let (tx, rx) = oneshot::channel();
        entries.insert(id.clone(), Entry { seq, peer, tx });
        Some(PendingCall {
            id,
            seq,
            rx,
            timeout,
            deadline: Instant::now() + timeout,
            table: Rc::clone(&self.inner),
        })
    }

    /// Deliver a response. `from` is the peer the response arrived from.
    pub fn resolve(&self, id: &RequestId, from: Option<&str>, outcome: Outcome) -> Delivery {
        let entry = {
            let mut entries = self.inner.entries.borrow_mut();
            let peer_matches = match entries.get(id) {
                None => return Delivery::Unknown,
                Some(entry) => entry.peer.is_none() || entry.peer.as_deref() == from,
            };
            if !peer_matches {
                return Delivery::WrongPeer;
            }
            entries.remove(id)
        };
        if let Some(entry) = entry {
            // The waiter may have given up already; nothing to do then.
            let _ = entry.tx.send(outcome);
        }
        Delivery::Resolved
    }

    /// Number of calls awaiting a response.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail every pending call with [`CallError::Cancelled`].
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<Entry> = self
            .inner
            .entries
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(CallError::Cancelled(reason.to_string())));
        }
        if count > 0 {
            debug!(count, reason, "cancelled pending calls");
        }
        count
    }

    /// Fail every call sent to `peer` with [`CallError::Disconnected`].
    pub fn fail_peer(&self, peer: &str) -> usize {
        let failed: Vec<Entry> = {
            let mut entries = self.inner.entries.borrow_mut();
            let ids: Vec<RequestId> = entries
                .iter()
                .filter(|(_, entry)| entry.peer.as_deref() == Some(peer))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };
        let count = failed.len();
        for entry in failed {
            let _ = entry.tx.send(Err(CallError::Disconnected(peer.to_string())));
        }
        count
    }
}

/// A registered outbound call. Dropping it removes the table entry.
pub struct PendingCall {
    id: RequestId,
    seq: u64,
    rx: oneshot::Receiver<Outcome>,
    timeout: Duration,
    deadline: Instant,
    table: Rc<Table>,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Outcome {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CallError::Cancelled("pending call dropped".to_string())),
            Err(_) => Err(CallError::Timeout(self.timeout)),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let mut entries = self.table.entries.borrow_mut();
        if entries.get(&self.id).is_some_and(|e| e.seq == self.seq) {
            entries.remove(&self.id);
        }
    }
}
