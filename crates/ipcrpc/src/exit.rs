use std::fmt;
use std::io;

use ipcrpc_frame::FrameError;
use ipcrpc_manager::IpcError;
use ipcrpc_protocol::{CallError, ErrorCode};
use ipcrpc_security::SecurityError;
use ipcrpc_transport::TransportError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::InvalidName(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        FrameError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
    }
}

pub fn security_error(context: &str, err: SecurityError) -> CliError {
    let code = match err {
        SecurityError::AuthNotConfigured => USAGE,
        SecurityError::TokenFormat
        | SecurityError::InvalidSignature
        | SecurityError::TokenPayload
        | SecurityError::MissingTimestamp
        | SecurityError::Expired { .. }
        | SecurityError::RateLimited => PERMISSION_DENIED,
        _ => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn call_error(context: &str, err: CallError) -> CliError {
    let code = match &err {
        CallError::Timeout(_) => TIMEOUT,
        CallError::Disconnected(_) => TRANSPORT_ERROR,
        CallError::Cancelled(_) => FAILURE,
        CallError::Remote(rpc) => match rpc.code {
            ErrorCode::PermissionDenied => PERMISSION_DENIED,
            ErrorCode::InvalidParams | ErrorCode::ParseError | ErrorCode::InvalidRequest => {
                DATA_INVALID
            }
            ErrorCode::Timeout => TIMEOUT,
            _ => FAILURE,
        },
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn ipc_error(context: &str, err: IpcError) -> CliError {
    match err {
        IpcError::Transport(err) => transport_error(context, err),
        IpcError::Frame(err) => frame_error(context, err),
        IpcError::Call(err) => call_error(context, err),
        IpcError::Security(err) => security_error(context, err),
        IpcError::AuthenticationFailed(_) => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        IpcError::NotConnected | IpcError::UnknownPeer(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        IpcError::ReservedService(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ipcrpc_protocol::RpcError;

    use super::*;

    #[test]
    fn call_failures_map_to_distinct_codes() {
        let timeout = ipc_error("call", IpcError::Call(CallError::Timeout(Duration::from_secs(1))));
        assert_eq!(timeout.code, TIMEOUT);

        let denied = ipc_error(
            "call",
            IpcError::Call(CallError::Remote(RpcError::permission_denied("nope"))),
        );
        assert_eq!(denied.code, PERMISSION_DENIED);

        let missing = ipc_error(
            "call",
            IpcError::Call(CallError::Remote(RpcError::method_not_found("x.y"))),
        );
        assert_eq!(missing.code, FAILURE);
        assert!(missing.message.starts_with("call: "));
    }

    #[test]
    fn token_failures_are_permission_denied() {
        assert_eq!(
            security_error("verify", SecurityError::InvalidSignature).code,
            PERMISSION_DENIED
        );
        assert_eq!(
            security_error("mint", SecurityError::AuthNotConfigured).code,
            USAGE
        );
    }
}
