use std::path::PathBuf;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The address to connect to does not exist.
    #[error("endpoint does not exist: {0}")]
    AddressNotFound(String),

    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The endpoint name contains characters that are not allowed in an address.
    #[error("invalid endpoint name '{0}' (allowed: ASCII letters, digits, '-', '_')")]
    InvalidName(String),

    /// The operation did not complete within the configured I/O timeout.
    #[error("transport operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// No transport implementation exists for this platform.
    #[error("unsupported platform for IPC: {0}")]
    Unsupported(&'static str),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
