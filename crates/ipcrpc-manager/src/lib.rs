//! IPC manager for ipcrpc.
//!
//! Composes the lower layers into one endpoint: a transport listener or
//! connection, per-peer frame readers and writers, the security gate, the
//! JSON-RPC engine and the router. A server accepts up to
//! `max_connections` peers; a client holds one connection to the server.
//!
//! Everything runs on one thread inside a `tokio::task::LocalSet`:
//!
//! ```ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let server = IpcManager::with_name("main");
//!     server.register_method(MethodSpec::sync("echo", |args| {
//!         Ok(args.get(0).cloned().unwrap_or_default())
//!     }), "demo")?;
//!     let address = server.start_server()?;
//!
//!     let client = IpcManager::with_name("renderer");
//!     client.connect_to_server(&address).await?;
//!     let reply = client.call_method("echo", Some(json!(["hi"])), None).await?;
//!     assert_eq!(reply, json!("hi"));
//!     Ok::<_, IpcError>(())
//! }).await?;
//! ```

mod builtin;
pub mod config;
mod connection;
pub mod error;
mod manager;
pub mod state;

pub use builtin::{IPC_SERVICE, UNAUTHENTICATED_METHODS};
pub use config::{ManagerConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_INACTIVITY_TIMEOUT};
pub use connection::ConnectionInfo;
pub use error::{IpcError, Result};
pub use manager::{IpcManager, ManagerInfo, SERVER_PEER};
pub use state::{ManagerState, Role};
