//! JSON-RPC 2.0 for ipcrpc.
//!
//! Builds and parses envelopes, dispatches inbound requests through the
//! [`Dispatch`] seam, and correlates responses with outbound calls via a
//! pending-call table.
//!
//! The engine is single-threaded: it is shared through `Rc` and driven from a
//! `tokio::task::LocalSet`.

pub mod context;
pub mod engine;
pub mod error;
pub mod message;
pub mod pending;

pub use context::CallContext;
pub use engine::{Dispatch, ProtocolEngine, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ErrorCode, RpcError};
pub use message::{
    create_error_response, create_notification, create_request, create_response, InvalidMessage,
    RequestId, RpcMessage, JSONRPC_VERSION,
};
pub use pending::{CallError, Delivery, PendingCall, PendingCalls};
