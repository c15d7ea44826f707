use ipcrpc_protocol::{CallError, ErrorCode, RpcError};

use crate::state::ManagerState;

/// Errors surfaced by [`IpcManager`](crate::IpcManager).
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ipcrpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ipcrpc_frame::FrameError),

    /// An outbound call failed: remote error, timeout, cancellation or
    /// disconnect.
    #[error(transparent)]
    Call(#[from] CallError),

    /// Security configuration or token error.
    #[error("security error: {0}")]
    Security(#[from] ipcrpc_security::SecurityError),

    /// The operation is not valid in the manager's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ManagerState,
    },

    /// No active connection to send on.
    #[error("not connected")]
    NotConnected,

    /// No connection with this peer id.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// A default peer was requested but several are connected.
    #[error("{0} peers connected; use call_peer/notify_peer to pick one")]
    AmbiguousPeer(usize),

    /// The server refused the configured security token.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The `ipc` service name is reserved for built-in methods.
    #[error("service name '{0}' is reserved")]
    ReservedService(String),
}

impl IpcError {
    /// The RPC error a peer answered with, if that is what failed.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Call(CallError::Remote(err)) => Some(err),
            _ => None,
        }
    }

    /// JSON-RPC code describing the failure, if it came from a call.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Call(err) => Some(err.code()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Call(CallError::Timeout(_)))
    }

    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Call(CallError::Disconnected(_)) | Self::NotConnected => true,
            Self::Frame(err) => err.is_disconnect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IpcError>;
