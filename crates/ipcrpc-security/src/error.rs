use ipcrpc_protocol::{ErrorCode, RpcError};

/// Security policy and token failures.
///
/// Messages never include token contents or signature material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("message too large: {size} bytes > {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("JSON structure too deep: {depth} > {max}")]
    TooDeep { depth: usize, max: usize },

    #[error("string too long: {len} > {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("object key too long: {len} > {max}")]
    KeyTooLong { len: usize, max: usize },

    #[error("array too long: {len} > {max}")]
    ArrayTooLong { len: usize, max: usize },

    #[error("method blocked: {0}")]
    MethodBlocked(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("potentially dangerous method name: {0}")]
    DangerousMethod(String),

    #[error("dangerous parameter name: {0}")]
    DangerousParameter(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid token format")]
    TokenFormat,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("invalid token payload")]
    TokenPayload,

    #[error("token missing timestamp")]
    MissingTimestamp,

    #[error("token expired: {age}s > {max_age}s")]
    Expired { age: i64, max_age: u64 },

    #[error("authentication not configured")]
    AuthNotConfigured,
}

impl SecurityError {
    /// Short violation name for audit logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::TooDeep { .. } => "too_deep",
            Self::StringTooLong { .. } => "string_too_long",
            Self::KeyTooLong { .. } => "key_too_long",
            Self::ArrayTooLong { .. } => "array_too_long",
            Self::MethodBlocked(_) => "method_blocked",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::DangerousMethod(_) => "dangerous_method",
            Self::DangerousParameter(_) => "dangerous_parameter",
            Self::RateLimited => "rate_limited",
            Self::TokenFormat => "token_format",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenPayload => "token_payload",
            Self::MissingTimestamp => "missing_timestamp",
            Self::Expired { .. } => "token_expired",
            Self::AuthNotConfigured => "auth_not_configured",
        }
    }
}

/// Malformed input that is not a policy violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("method must be a string")]
    MethodNotString,
}

/// Why an inbound message was refused before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl InboundError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Security(err) => err.kind(),
            Self::Validation(ValidationError::InvalidJson(_)) => "invalid_json",
            Self::Validation(ValidationError::MethodNotString) => "invalid_method",
        }
    }

    /// The error a peer is told about. Parse failures keep their JSON-RPC
    /// code; every policy violation is reported as permission denied.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Validation(ValidationError::InvalidJson(_)) => RpcError::parse_error(),
            Self::Validation(ValidationError::MethodNotString) => RpcError::invalid_request(),
            Self::Security(err) => RpcError::new(ErrorCode::PermissionDenied, err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SecurityError>;
