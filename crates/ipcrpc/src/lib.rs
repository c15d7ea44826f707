//! Secure local JSON-RPC between the processes of one application.
//!
//! ipcrpc connects a controller process with its workers over Unix domain
//! sockets or named pipes, frames JSON-RPC 2.0 messages, enforces a security
//! policy on untrusted input and routes validated calls to registered
//! handlers, all on a single-threaded cooperative scheduler.
//!
//! # Crate Structure
//!
//! - [`transport`] — Private endpoints and duplex streams (UDS, named pipes)
//! - [`frame`] — Length-prefixed framing with a bounded frame size
//! - [`protocol`] — JSON-RPC envelopes, dispatch and call correlation
//! - [`security`] — Rate limiting, input validation and signed tokens
//! - [`router`] — Service registry, middleware and permission checks
//! - [`manager`] — The endpoint that ties the layers together

/// Re-export transport types.
pub mod transport {
    pub use ipcrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ipcrpc_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use ipcrpc_protocol::*;
}

/// Re-export security types.
pub mod security {
    pub use ipcrpc_security::*;
}

/// Re-export router types.
pub mod router {
    pub use ipcrpc_router::*;
}

/// Re-export manager types.
pub mod manager {
    pub use ipcrpc_manager::*;
}

pub use ipcrpc_manager::{IpcError, IpcManager, ManagerConfig};
pub use ipcrpc_protocol::{CallContext, ErrorCode, RpcError};
pub use ipcrpc_router::{Args, HandlerError, MessageRouter, MethodSpec, Service};
pub use ipcrpc_security::SecurityConfig;
pub use ipcrpc_transport::TransportConfig;
