use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use ipcrpc_frame::FrameWriter;
use ipcrpc_protocol::CallContext;
use ipcrpc_transport::{IpcStream, PeerCredentials};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::WriteHalf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Write side of a connection, shared between the receive loop (replies)
/// and outbound calls.
pub(crate) type SharedWriter = Rc<Mutex<FrameWriter<WriteHalf<IpcStream>>>>;

/// Snapshot of one peer connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub peer_id: String,
    /// Unique id for this connection instance, stable across logs.
    pub connection_id: String,
    pub transport: &'static str,
    /// Credentials of the peer process, where the platform reports them.
    pub credentials: Option<PeerCredentials>,
    pub authenticated: bool,
    pub permissions: BTreeSet<String>,
    /// Seconds since the connection was accepted.
    pub age_secs: u64,
    /// Seconds since the last inbound message.
    pub idle_secs: u64,
}

/// Manager-owned state for one peer.
pub(crate) struct Connection {
    pub(crate) peer_id: String,
    pub(crate) connection_id: String,
    pub(crate) transport: &'static str,
    pub(crate) credentials: Option<PeerCredentials>,
    pub(crate) created_at: Instant,
    pub(crate) last_activity: Instant,
    pub(crate) authenticated: bool,
    pub(crate) permissions: BTreeSet<String>,
    pub(crate) writer: SharedWriter,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn new(
        peer_id: String,
        transport: &'static str,
        credentials: Option<PeerCredentials>,
        writer: SharedWriter,
    ) -> Self {
        let now = Instant::now();
        Self {
            peer_id,
            connection_id: uuid::Uuid::new_v4().to_string(),
            transport,
            credentials,
            created_at: now,
            last_activity: now,
            authenticated: false,
            permissions: BTreeSet::new(),
            writer,
            task: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Context handed to handlers for calls from this peer.
    pub(crate) fn context(&self) -> CallContext {
        let mut metadata = Map::new();
        metadata.insert(
            "connection_id".to_string(),
            Value::from(self.connection_id.as_str()),
        );
        if let Some(creds) = self.credentials {
            metadata.insert("peer_pid".to_string(), Value::from(creds.pid));
            metadata.insert("peer_uid".to_string(), Value::from(creds.uid));
        }
        CallContext {
            peer_id: Some(self.peer_id.clone()),
            authenticated: self.authenticated,
            permissions: self.permissions.clone(),
            metadata,
        }
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        let now = Instant::now();
        ConnectionInfo {
            peer_id: self.peer_id.clone(),
            connection_id: self.connection_id.clone(),
            transport: self.transport,
            credentials: self.credentials,
            authenticated: self.authenticated,
            permissions: self.permissions.clone(),
            age_secs: now.saturating_duration_since(self.created_at).as_secs(),
            idle_secs: self.idle_for(now).as_secs(),
        }
    }

    /// Stop the receive loop. Dropping the entry then releases the stream.
    pub(crate) fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
