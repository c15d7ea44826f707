use std::fmt;

use serde_json::{json, Value};

/// JSON-RPC error codes, including the application range used by ipcrpc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid JSON was received (-32700).
    ParseError,
    /// The JSON sent is not a valid request object (-32600).
    InvalidRequest,
    /// The method does not exist or is not available (-32601).
    MethodNotFound,
    /// Invalid method parameters (-32602).
    InvalidParams,
    /// Internal error (-32603).
    InternalError,
    /// Authentication, permission or security policy failure (-32000).
    PermissionDenied,
    /// The call did not complete in time (-32001).
    Timeout,
    /// A peer process failed (-32002).
    ProcessError,
    /// Any other code received from a peer.
    Other(i64),
}

impl ErrorCode {
    /// Numeric wire value.
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::PermissionDenied => -32000,
            Self::Timeout => -32001,
            Self::ProcessError => -32002,
            Self::Other(code) => code,
        }
    }

    /// Map a numeric wire value back to a code.
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::PermissionDenied,
            -32001 => Self::Timeout,
            -32002 => Self::ProcessError,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A JSON-RPC error object: code, message and optional data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorCode::InvalidRequest, "Invalid request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// The `error` member of a JSON-RPC error response.
    pub fn to_value(&self) -> Value {
        json!({
            "code": self.code.code(),
            "message": self.message,
            "data": self.data,
        })
    }

    /// Parse the `error` member of a JSON-RPC error response.
    ///
    /// Tolerates missing members the way peers in the wild emit them.
    pub fn from_value(value: &Value) -> Self {
        let code = value
            .get("code")
            .and_then(Value::as_i64)
            .map(ErrorCode::from_code)
            .unwrap_or(ErrorCode::Other(-1));
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        let data = value.get("data").filter(|d| !d.is_null()).cloned();
        Self {
            code,
            message,
            data,
        }
    }
}
