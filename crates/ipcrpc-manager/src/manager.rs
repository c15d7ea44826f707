use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use ipcrpc_frame::{FrameConfig, FrameReader};
use ipcrpc_protocol::{
    create_error_response, create_notification, CallContext, Dispatch, ProtocolEngine, RequestId,
    RpcError,
};
use ipcrpc_router::{HandlerError, MessageRouter, MethodSpec, Service};
use ipcrpc_security::{InboundError, IpcSecurity, SecurityError, ValidationError};
use ipcrpc_transport::{IpcListener, IpcStream, Transport};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::ReadHalf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::builtin::{self, IPC_SERVICE};
use crate::config::ManagerConfig;
use crate::connection::{Connection, ConnectionInfo, SharedWriter};
use crate::error::{IpcError, Result};
use crate::state::{ManagerState, Role};

/// Peer id a client uses for its connection to the server.
pub const SERVER_PEER: &str = "server";

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type ShutdownHandler = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()>>;

/// Top-level IPC endpoint: owns the transport, runs the accept, receive and
/// cleanup loops, and exposes call, notify and register operations.
///
/// The manager is single-threaded. [`start_server`](Self::start_server) and
/// [`connect_to_server`](Self::connect_to_server) spawn their loops with
/// `tokio::task::spawn_local`, so they must run inside a
/// [`LocalSet`](tokio::task::LocalSet).
///
/// Each connection is served strictly in order: the next frame from a peer is
/// not read until the reply to the current one has been written.
///
/// Clones share one endpoint. A clone moved into an
/// [`on_shutdown`](Self::on_shutdown) handler keeps the manager alive until
/// [`shutdown`](Self::shutdown) runs the handler.
#[derive(Clone)]
pub struct IpcManager {
    shared: Rc<Shared>,
}

pub(crate) struct Shared {
    config: ManagerConfig,
    state: Cell<ManagerState>,
    role: Cell<Option<Role>>,
    router: Rc<MessageRouter>,
    engine: ProtocolEngine,
    security: Option<RefCell<IpcSecurity>>,
    connections: RefCell<BTreeMap<String, Connection>>,
    listener: RefCell<Option<Rc<IpcListener>>>,
    address: RefCell<Option<String>>,
    tasks: RefCell<Vec<JoinHandle<()>>>,
    shutdown_handlers: RefCell<Vec<ShutdownHandler>>,
    next_peer: Cell<u64>,
    started_at: Cell<Option<Instant>>,
}

/// System information for collaborators such as a process supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerInfo {
    pub name: String,
    pub state: ManagerState,
    pub role: Option<Role>,
    pub address: Option<String>,
    pub transport: Option<&'static str>,
    pub pid: u32,
    pub connections: usize,
    pub pending_calls: usize,
    pub services: Vec<String>,
    pub method_count: usize,
    pub security_enabled: bool,
    pub auth_required: bool,
    pub uptime_secs: u64,
}

impl IpcManager {
    pub fn new(config: ManagerConfig) -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<Shared>| {
            let router = Rc::new(MessageRouter::new());
            router.register_service(builtin::service(weak.clone()));

            let security = config.security.clone().map(IpcSecurity::new);
            if security.as_ref().is_some_and(IpcSecurity::auth_required) {
                builtin::install_auth_gate(&router);
            }

            let dispatcher: Rc<dyn Dispatch> = router.clone();
            let engine =
                ProtocolEngine::new(dispatcher).with_request_timeout(config.request_timeout);

            Shared {
                state: Cell::new(ManagerState::Idle),
                role: Cell::new(None),
                router,
                engine,
                security: security.map(RefCell::new),
                connections: RefCell::new(BTreeMap::new()),
                listener: RefCell::new(None),
                address: RefCell::new(None),
                tasks: RefCell::new(Vec::new()),
                shutdown_handlers: RefCell::new(Vec::new()),
                next_peer: Cell::new(1),
                started_at: Cell::new(None),
                config,
            }
        });
        debug!(name = %shared.config.name(), "IPC manager initialized");
        Self { shared }
    }

    /// Manager with default configuration for an endpoint name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(ManagerConfig::new(name))
    }

    pub fn name(&self) -> &str {
        self.shared.config.name()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ManagerState {
        self.shared.state.get()
    }

    /// Server address, or the address the client connected to.
    pub fn address(&self) -> Option<String> {
        self.shared.address.borrow().clone()
    }

    /// The router inbound calls are dispatched through.
    pub fn router(&self) -> &Rc<MessageRouter> {
        &self.shared.router
    }

    /// Register a service of handlers. The `ipc` service name is reserved.
    pub fn register_service(&self, service: Service) -> Result<()> {
        if service.name() == IPC_SERVICE {
            return Err(IpcError::ReservedService(IPC_SERVICE.to_string()));
        }
        self.shared.router.register_service(service);
        Ok(())
    }

    /// Register a single handler under `service`.
    pub fn register_method(&self, spec: MethodSpec, service: &str) -> Result<()> {
        if service == IPC_SERVICE || spec.name().starts_with("ipc.") {
            return Err(IpcError::ReservedService(IPC_SERVICE.to_string()));
        }
        self.shared.router.register_method(spec, service);
        Ok(())
    }

    /// Bind a fresh endpoint and start accepting peers. Returns the address
    /// clients connect to.
    pub fn start_server(&self) -> Result<String> {
        let shared = &self.shared;
        shared.begin(Role::Server, "start server")?;

        let listener = match Transport::for_platform()
            .and_then(|transport| transport.start_server(&shared.config.transport))
        {
            Ok(listener) => Rc::new(listener),
            Err(err) => {
                shared.state.set(ManagerState::Idle);
                return Err(err.into());
            }
        };
        let address = listener.address();
        *shared.listener.borrow_mut() = Some(Rc::clone(&listener));
        *shared.address.borrow_mut() = Some(address.clone());

        let weak = Rc::downgrade(shared);
        let accept = tokio::task::spawn_local(accept_loop(weak.clone(), listener));
        let cleanup = tokio::task::spawn_local(cleanup_loop(
            weak,
            shared.config.cleanup_interval,
            shared.config.inactivity_timeout,
        ));
        shared.tasks.borrow_mut().extend([accept, cleanup]);
        shared.activate(Role::Server);

        info!(name = %self.name(), %address, "IPC server started");
        Ok(address)
    }

    /// Connect to a server address and start the receive loop.
    ///
    /// When the transport config carries a security token it is presented
    /// with `ipc.authenticate`; a refused token fails the connect.
    pub async fn connect_to_server(&self, address: &str) -> Result<()> {
        let shared = &self.shared;
        shared.begin(Role::Client, "connect")?;

        let timeout = shared.config.transport.timeout;
        let stream = match Transport::for_platform() {
            Ok(transport) => transport.connect(address, timeout).await,
            Err(err) => Err(err),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                shared.state.set(ManagerState::Idle);
                return Err(err.into());
            }
        };

        attach(shared, SERVER_PEER.to_string(), stream, true);
        *shared.address.borrow_mut() = Some(address.to_string());
        shared.activate(Role::Client);
        info!(name = %self.name(), %address, "connected to IPC server");

        if let Some(token) = shared.config.transport.security_token.clone() {
            if let Err(err) = self.authenticate(&token).await {
                shared.remove_connection(SERVER_PEER, "authentication failed");
                shared.address.borrow_mut().take();
                shared.state.set(ManagerState::Idle);
                return Err(match err {
                    IpcError::Call(ipcrpc_protocol::CallError::Remote(rpc)) => {
                        IpcError::AuthenticationFailed(rpc.message)
                    }
                    other => other,
                });
            }
        }
        Ok(())
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        let reply = self
            .call_peer(SERVER_PEER, "ipc.authenticate", Some(json!([token])), None)
            .await?;
        if reply.get("authenticated").and_then(Value::as_bool) == Some(true) {
            debug!("authenticated with server");
        } else {
            debug!("server does not verify tokens");
        }
        Ok(())
    }

    /// Call a method on the default peer: the server for a client, or the
    /// only connected peer for a server.
    pub async fn call_method(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let peer = self.shared.default_peer()?;
        self.call_peer(&peer, method, params, timeout).await
    }

    /// Call a method on a specific peer and wait for the result.
    ///
    /// `timeout` defaults to the configured request timeout. A timeout is
    /// reported as [`CallError::Timeout`](ipcrpc_protocol::CallError::Timeout),
    /// distinct from errors the peer answered with.
    pub async fn call_peer(
        &self,
        peer_id: &str,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let shared = &self.shared;
        shared.ensure_can_send()?;
        shared.writer(peer_id)?;
        shared
            .engine
            .call_method(method, params, timeout, Some(peer_id), |request| async move {
                shared.send_to(peer_id, &request).await
            })
            .await
    }

    /// Send a notification to the default peer.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let peer = self.shared.default_peer()?;
        self.notify_peer(&peer, method, params).await
    }

    /// Send a notification to a specific peer. No reply is expected.
    pub async fn notify_peer(
        &self,
        peer_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<()> {
        self.shared.ensure_can_send()?;
        self.shared
            .send_to(peer_id, &create_notification(method, params))
            .await?;
        debug!(peer_id = %peer_id, %method, "sent notification");
        Ok(())
    }

    pub fn connection_info(&self, peer_id: &str) -> Option<ConnectionInfo> {
        self.shared
            .connections
            .borrow()
            .get(peer_id)
            .map(Connection::info)
    }

    /// All connections, sorted by peer id.
    pub fn list_connections(&self) -> Vec<ConnectionInfo> {
        self.shared
            .connections
            .borrow()
            .values()
            .map(Connection::info)
            .collect()
    }

    /// Drop a peer's connection. Pending calls to it fail as disconnected.
    pub fn disconnect_client(&self, peer_id: &str) -> bool {
        self.shared.remove_connection(peer_id, "disconnected locally")
    }

    /// Evict connections idle longer than the inactivity timeout and prune
    /// rate limiter state. Runs periodically on a server; returns the number
    /// of evicted connections.
    pub fn cleanup(&self) -> usize {
        self.shared.sweep(self.shared.config.inactivity_timeout)
    }

    /// Mint a token for a client using this manager's auth secret.
    pub fn generate_auth_token(&self, client_id: &str, permissions: &[String]) -> Result<String> {
        let security = self
            .shared
            .security
            .as_ref()
            .ok_or(SecurityError::AuthNotConfigured)?;
        Ok(security
            .borrow()
            .generate_auth_token(client_id, permissions)?)
    }

    pub fn info(&self) -> ManagerInfo {
        let shared = &self.shared;
        let state = shared.state.get();
        let security = shared.security.as_ref().map(|s| s.borrow().auth_required());
        ManagerInfo {
            name: self.name().to_string(),
            state,
            role: state.role(),
            address: self.address(),
            transport: Transport::for_platform().ok().map(Transport::name),
            pid: std::process::id(),
            connections: shared.connections.borrow().len(),
            pending_calls: shared.engine.pending_count(),
            services: shared.router.list_services(),
            method_count: shared.router.list_methods(None).len(),
            security_enabled: security.is_some(),
            auth_required: security.unwrap_or(false),
            uptime_secs: shared
                .started_at
                .get()
                .map(|at| at.elapsed().as_secs())
                .unwrap_or(0),
        }
    }

    /// Register a handler run during [`shutdown`](Self::shutdown), before
    /// the transport closes. Handlers may still call and notify peers.
    pub fn on_shutdown<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.shared
            .shutdown_handlers
            .borrow_mut()
            .push(Box::new(move || handler().boxed_local()));
    }

    /// Stop the loops, run shutdown handlers, close the transport, cancel
    /// outstanding calls and clear connection state, in that order.
    pub async fn shutdown(&self) -> Result<()> {
        let shared = &self.shared;
        match shared.state.get() {
            ManagerState::Closed => return Ok(()),
            state @ ManagerState::ShuttingDown => {
                return Err(IpcError::InvalidState {
                    operation: "shut down",
                    state,
                })
            }
            _ => {}
        }
        info!(name = %self.name(), "shutting down IPC manager");
        shared.state.set(ManagerState::ShuttingDown);

        for task in shared.tasks.borrow_mut().drain(..) {
            task.abort();
        }

        let handlers: Vec<ShutdownHandler> = shared.shutdown_handlers.borrow_mut().drain(..).collect();
        for handler in handlers {
            if AssertUnwindSafe(handler()).catch_unwind().await.is_err() {
                error!("shutdown handler panicked");
            }
        }

        if let Some(listener) = shared.listener.borrow_mut().take() {
            listener.close();
        }
        let writers: Vec<SharedWriter> = shared
            .connections
            .borrow_mut()
            .values_mut()
            .map(|conn| {
                conn.abort();
                Rc::clone(&conn.writer)
            })
            .collect();
        for writer in writers {
            if let Err(err) = writer.lock().await.close().await {
                debug!(error = %err, "closing connection failed");
            }
        }

        let cancelled = shared.engine.cancel_all();
        shared.connections.borrow_mut().clear();
        shared.state.set(ManagerState::Closed);
        info!(name = %self.name(), cancelled_calls = cancelled, "IPC manager shut down");
        Ok(())
    }
}

impl std::fmt::Debug for IpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcManager")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) fn router(&self) -> &MessageRouter {
        &self.router
    }

    fn begin(&self, role: Role, operation: &'static str) -> Result<()> {
        match self.state.get() {
            ManagerState::Idle => {
                self.state.set(ManagerState::Starting(role));
                Ok(())
            }
            state => Err(IpcError::InvalidState { operation, state }),
        }
    }

    fn activate(&self, role: Role) {
        self.state.set(ManagerState::Active(role));
        self.role.set(Some(role));
        self.started_at.set(Some(Instant::now()));
    }

    /// Sending stays possible while shutting down so shutdown handlers can
    /// deliver final messages.
    fn ensure_can_send(&self) -> Result<()> {
        match self.state.get() {
            ManagerState::Active(_) | ManagerState::ShuttingDown => Ok(()),
            _ => Err(IpcError::NotConnected),
        }
    }

    fn default_peer(&self) -> Result<String> {
        self.ensure_can_send()?;
        let connections = self.connections.borrow();
        match self.role.get() {
            Some(Role::Client) if connections.contains_key(SERVER_PEER) => {
                Ok(SERVER_PEER.to_string())
            }
            Some(Role::Server) if connections.len() > 1 => {
                Err(IpcError::AmbiguousPeer(connections.len()))
            }
            Some(Role::Server) => connections
                .keys()
                .next()
                .cloned()
                .ok_or(IpcError::NotConnected),
            _ => Err(IpcError::NotConnected),
        }
    }

    fn writer(&self, peer_id: &str) -> Result<SharedWriter> {
        self.connections
            .borrow()
            .get(peer_id)
            .map(|conn| Rc::clone(&conn.writer))
            .ok_or_else(|| IpcError::UnknownPeer(peer_id.to_string()))
    }

    /// Record activity and build the call context for a peer.
    fn touch(&self, peer_id: &str) -> Option<CallContext> {
        let mut connections = self.connections.borrow_mut();
        let conn = connections.get_mut(peer_id)?;
        conn.touch();
        Some(conn.context())
    }

    async fn send_to(&self, peer_id: &str, payload: &str) -> Result<()> {
        let writer = self.writer(peer_id)?;
        let sent = writer.lock().await.send(payload.as_bytes()).await;
        if let Err(err) = sent {
            warn!(peer_id = %peer_id, error = %err, "send failed, closing connection");
            self.remove_connection(peer_id, "send failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Remove a connection, stop its receive loop and fail calls waiting on
    /// it.
    fn remove_connection(&self, peer_id: &str, reason: &str) -> bool {
        let removed = self.connections.borrow_mut().remove(peer_id);
        let Some(mut conn) = removed else {
            return false;
        };
        conn.abort();
        let failed = self.engine.pending().fail_peer(peer_id);
        info!(
            peer_id = %peer_id,
            connection_id = %conn.connection_id,
            %reason,
            failed_calls = failed,
            "connection removed"
        );
        true
    }

    fn sweep(&self, inactivity: Duration) -> usize {
        let now = Instant::now();
        let idle: Vec<String> = self
            .connections
            .borrow()
            .values()
            .filter(|conn| conn.idle_for(now) > inactivity)
            .map(|conn| conn.peer_id.clone())
            .collect();
        for peer_id in &idle {
            self.remove_connection(peer_id, "inactive");
        }
        if let Some(security) = &self.security {
            security.borrow_mut().cleanup();
        }
        idle.len()
    }

    /// `ipc.authenticate`: verify a token and mark the caller's connection.
    pub(crate) fn authenticate(
        &self,
        ctx: &CallContext,
        token: &str,
    ) -> ipcrpc_router::Result<Value> {
        let peer_id = ctx
            .peer_id
            .as_deref()
            .ok_or_else(|| RpcError::permission_denied("No connection to authenticate"))?;

        let verified = match &self.security {
            Some(security) => security.borrow().verify_token(token),
            None => Err(SecurityError::AuthNotConfigured),
        };
        let claims = match verified {
            Ok(claims) => claims,
            Err(SecurityError::AuthNotConfigured) => {
                return Ok(json!({ "authenticated": false }));
            }
            Err(err) => {
                warn!(peer_id = %peer_id, violation = err.kind(), "token rejected");
                return Err(HandlerError::Rpc(RpcError::permission_denied(format!(
                    "Authentication failed: {err}"
                ))));
            }
        };

        let permissions: BTreeSet<String> = claims
            .get("permissions")
            .and_then(Value::as_array)
            .map(|perms| {
                perms
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        {
            let mut connections = self.connections.borrow_mut();
            let conn = connections
                .get_mut(peer_id)
                .ok_or_else(|| RpcError::permission_denied("No connection to authenticate"))?;
            conn.authenticated = true;
            conn.permissions = permissions.clone();
        }

        let client_id = claims.get("client_id").cloned().unwrap_or(Value::Null);
        info!(peer_id = %peer_id, %client_id, ?permissions, "peer authenticated");
        Ok(json!({
            "authenticated": true,
            "client_id": client_id,
            "permissions": permissions,
        }))
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        for conn in self.connections.get_mut().values_mut() {
            conn.abort();
        }
        if let Some(listener) = self.listener.get_mut().take() {
            listener.close();
        }
    }
}

/// Register a connection and spawn its receive loop.
fn attach(shared: &Rc<Shared>, peer_id: String, stream: IpcStream, trusted: bool) {
    let frame_config = FrameConfig::from_transport(&shared.config.transport);
    let transport = stream.transport_name();
    let credentials = stream.peer_credentials();
    let (reader, writer) = ipcrpc_frame::split(stream, &frame_config);

    let mut conn = Connection::new(
        peer_id.clone(),
        transport,
        credentials,
        Rc::new(Mutex::new(writer)),
    );
    conn.authenticated = trusted;
    conn.task = Some(tokio::task::spawn_local(receive_loop(
        Rc::downgrade(shared),
        peer_id.clone(),
        reader,
    )));
    info!(
        peer_id = %peer_id,
        connection_id = %conn.connection_id,
        ?credentials,
        "peer connected"
    );
    shared.connections.borrow_mut().insert(peer_id, conn);
}

async fn accept_loop(weak: Weak<Shared>, listener: Rc<IpcListener>) {
    loop {
        let accepted = listener.accept().await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match accepted {
            Ok(stream) => {
                let max = shared.config.transport.max_connections;
                if shared.connections.borrow().len() >= max {
                    warn!(max_connections = max, "connection limit reached, refusing peer");
                    continue;
                }
                let id = shared.next_peer.get();
                shared.next_peer.set(id + 1);
                attach(&shared, format!("peer-{id}"), stream, false);
            }
            Err(err) => {
                if !shared.state.get().is_active() {
                    return;
                }
                warn!(error = %err, "accept failed");
                drop(shared);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn receive_loop(
    weak: Weak<Shared>,
    peer_id: String,
    mut reader: FrameReader<ReadHalf<IpcStream>>,
) {
    loop {
        let frame = reader.read_frame().await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match frame {
            Ok(payload) => handle_frame(&shared, &peer_id, &payload).await,
            Err(err) => {
                if err.is_disconnect() {
                    debug!(peer_id = %peer_id, "peer closed the connection");
                } else {
                    warn!(peer_id = %peer_id, error = %err, "receive failed, closing connection");
                }
                shared.remove_connection(&peer_id, &err.to_string());
                return;
            }
        }
    }
}

/// Validate, process and answer one inbound frame.
async fn handle_frame(shared: &Shared, peer_id: &str, payload: &[u8]) {
    let Some(ctx) = shared.touch(peer_id) else {
        return;
    };

    let reply = match std::str::from_utf8(payload) {
        Err(_) => {
            warn!(peer_id = %peer_id, violation = "invalid_utf8", "inbound message refused");
            Some(create_error_response(None, &RpcError::parse_error()))
        }
        Ok(raw) => match &shared.security {
            Some(security) => {
                let checked = security.borrow_mut().validate_incoming_message(raw, peer_id);
                match checked {
                    Ok(value) => shared.engine.process_value(value, &ctx).await,
                    Err(err) => refusal_reply(raw, &err),
                }
            }
            None => shared.engine.process_message(raw, &ctx).await,
        },
    };

    if let Some(reply) = reply {
        if let Err(err) = shared.send_to(peer_id, &reply).await {
            debug!(peer_id = %peer_id, error = %err, "reply not delivered");
        }
    }
}

/// Error reply for a message the security layer refused.
///
/// Requests get an error carrying their id; notifications and responses are
/// never answered. Unparseable input gets a parse error with a null id.
fn refusal_reply(raw: &str, err: &InboundError) -> Option<String> {
    let error = err.to_rpc_error();
    if matches!(err, InboundError::Validation(ValidationError::InvalidJson(_))) {
        return Some(create_error_response(None, &error));
    }
    let envelope = serde_json::from_str::<Value>(raw).ok();
    let Some(envelope) = envelope.as_ref().and_then(Value::as_object) else {
        return Some(create_error_response(None, &error));
    };
    if !envelope.contains_key("method") {
        return None;
    }
    // A null or missing id marks a notification.
    match envelope.get("id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(create_error_response(
            RequestId::from_value(id).as_ref(),
            &error,
        )),
    }
}

async fn cleanup_loop(weak: Weak<Shared>, interval: Duration, inactivity: Duration) {
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let evicted = shared.sweep(inactivity);
        if evicted > 0 {
            info!(evicted, "inactive connections removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use ipcrpc_protocol::ErrorCode;

    use super::*;

    fn reply_value(reply: Option<String>) -> Value {
        serde_json::from_str(&reply.expect("reply expected")).unwrap()
    }

    #[test]
    fn refused_request_keeps_its_id() {
        let err = InboundError::Security(SecurityError::MethodBlocked("exec".into()));
        let reply = reply_value(refusal_reply(
            r#"{"jsonrpc":"2.0","id":7,"method":"exec"}"#,
            &err,
        ));
        assert_eq!(reply["id"], json!(7));
        assert_eq!(reply["error"]["code"], json!(ErrorCode::PermissionDenied.code()));
        assert_eq!(reply["error"]["message"], "method blocked: exec");
    }

    #[test]
    fn refused_notification_is_not_answered() {
        let err = InboundError::Security(SecurityError::RateLimited);
        assert!(refusal_reply(r#"{"jsonrpc":"2.0","method":"tick"}"#, &err).is_none());
        assert!(refusal_reply(r#"{"jsonrpc":"2.0","id":"a","result":1}"#, &err).is_none());
    }

    #[test]
    fn refused_null_id_notification_is_not_answered() {
        let err = InboundError::Security(SecurityError::DangerousMethod("os.system".into()));
        assert!(refusal_reply(
            r#"{"jsonrpc":"2.0","id":null,"method":"os.system"}"#,
            &err
        )
        .is_none());
    }

    #[test]
    fn unparseable_input_gets_parse_error() {
        let err = InboundError::Validation(ValidationError::InvalidJson("eof".into()));
        let reply = reply_value(refusal_reply("{oops", &err));
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], json!(-32700));
    }

    #[test]
    fn non_string_method_is_invalid_request() {
        let err = InboundError::Validation(ValidationError::MethodNotString);
        let reply = reply_value(refusal_reply(r#"{"jsonrpc":"2.0","id":1,"method":5}"#, &err));
        assert_eq!(reply["id"], json!(1));
        assert_eq!(reply["error"]["code"], json!(-32600));
    }

    #[test]
    fn reserved_service_name_rejected() {
        let manager = IpcManager::with_name("reserved");
        let err = manager
            .register_service(Service::new("ipc"))
            .unwrap_err();
        assert!(matches!(err, IpcError::ReservedService(_)));
        assert!(manager
            .register_method(MethodSpec::sync("ipc.reboot", |_| Ok(Value::Null)), "admin")
            .is_err());
        assert!(manager
            .register_method(MethodSpec::sync("reboot", |_| Ok(Value::Null)), "admin")
            .is_ok());
    }

    #[test]
    fn idle_manager_reports_state() {
        let manager = IpcManager::with_name("idle");
        assert_eq!(manager.state(), ManagerState::Idle);
        let info = manager.info();
        assert_eq!(info.name, "idle");
        assert_eq!(info.connections, 0);
        assert!(info.services.contains(&"ipc".to_string()));
        assert!(info.security_enabled);
        assert!(!info.auth_required);
    }

    #[tokio::test]
    async fn calls_require_an_active_manager() {
        let manager = IpcManager::with_name("idle");
        let err = manager.call_method("ipc.ping", None, None).await.unwrap_err();
        assert!(matches!(err, IpcError::NotConnected));
        let err = manager.send_notification("tick", None).await.unwrap_err();
        assert!(matches!(err, IpcError::NotConnected));
    }

    #[tokio::test]
    async fn shutdown_runs_handlers_once() {
        let manager = IpcManager::with_name("idle");
        let ran = Rc::new(Cell::new(0));
        let counter = ran.clone();
        manager.on_shutdown(move || async move { counter.set(counter.get() + 1) });
        manager.shutdown().await.unwrap();
        manager.shutdown().await.unwrap();
        assert_eq!(ran.get(), 1);
        assert_eq!(manager.state(), ManagerState::Closed);
    }

    #[test]
    fn token_minting_needs_a_secret() {
        let manager = IpcManager::with_name("plain");
        assert!(matches!(
            manager.generate_auth_token("cli", &[]),
            Err(IpcError::Security(SecurityError::AuthNotConfigured))
        ));

        let manager = IpcManager::new(ManagerConfig::secure("secure", "s3cret"));
        let token = manager
            .generate_auth_token("cli", &["admin".to_string()])
            .unwrap();
        assert!(token.contains("\"client_id\":\"cli\""));
    }
}
