use ipcrpc_protocol::RpcError;

/// Error returned by a method handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// The arguments did not fit the method. Reported as Invalid Params.
    #[error("{0}")]
    InvalidParams(String),

    /// A fully formed RPC error, passed to the peer unchanged.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Anything else. Reported as Internal Error.
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The RPC error a peer sees for this failure.
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::InvalidParams(message) => RpcError::invalid_params(message),
            Self::Rpc(err) => err,
            Self::Internal(message) => RpcError::internal(format!("Internal error: {message}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;
