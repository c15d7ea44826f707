use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default number of concurrently connected peers.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
/// Default I/O timeout for connect and write operations.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);
/// Default transport buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Transport configuration. Treated as immutable once handed to a listener
/// or connector.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Endpoint name, embedded in the generated address.
    pub name: String,
    /// Maximum concurrently connected peers on the server side.
    pub max_connections: usize,
    /// I/O timeout in milliseconds for connect and write operations.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Buffer size in bytes. Inbound frames may be at most ten times this size.
    pub buffer_size: usize,
    /// Optional token presented to the server after connecting.
    pub security_token: Option<String>,
    /// Override for the private endpoint directory (Unix only).
    pub directory: Option<PathBuf>,
}

impl TransportConfig {
    /// Configuration with defaults for the given endpoint name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Default configuration carrying a freshly generated random security token.
    pub fn default_for(name: impl Into<String>) -> Self {
        Self {
            security_token: Some(uuid::Uuid::new_v4().to_string()),
            ..Self::new(name)
        }
    }

    /// Largest frame body accepted on receive.
    pub fn max_frame_size(&self) -> usize {
        self.buffer_size.saturating_mul(10)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: "ipcrpc".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: DEFAULT_IO_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            security_token: None,
            directory: None,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("TransportConfig");
        dbg.field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("timeout", &self.timeout)
            .field("buffer_size", &self.buffer_size);
        if let Some(token) = &self.security_token {
            dbg.field(
                "security_token",
                &format_args!("<redacted:{} bytes>", token.len()),
            );
        } else {
            dbg.field("security_token", &Option::<String>::None);
        }
        dbg.field("directory", &self.directory).finish()
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
