use std::time::Duration;

use ipcrpc_protocol::DEFAULT_REQUEST_TIMEOUT;
use ipcrpc_security::SecurityConfig;
use ipcrpc_transport::TransportConfig;
use serde::Deserialize;

/// How often the server sweeps idle connections and rate limiter state.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Connections idle longer than this are evicted by the sweep.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Manager configuration.
///
/// Loadable from JSON; every field is optional and durations are integers
/// (`request_timeout_ms`, `cleanup_interval_secs`, `inactivity_timeout_secs`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub transport: TransportConfig,
    /// Inbound security policy. `None` skips validation entirely.
    pub security: Option<SecurityConfig>,
    /// Default timeout for outbound calls.
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(rename = "cleanup_interval_secs", with = "duration_secs")]
    pub cleanup_interval: Duration,
    #[serde(rename = "inactivity_timeout_secs", with = "duration_secs")]
    pub inactivity_timeout: Duration,
}

impl ManagerConfig {
    /// Defaults for the given endpoint name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::new(name),
            ..Self::default()
        }
    }

    /// Defaults plus [`SecurityConfig::secure`] with a shared secret.
    pub fn secure(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            security: Some(SecurityConfig::secure(secret)),
            ..Self::new(name)
        }
    }

    pub fn with_security(mut self, security: Option<SecurityConfig>) -> Self {
        self.security = security;
        self
    }

    pub fn name(&self) -> &str {
        &self.transport.name
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            security: Some(SecurityConfig::default()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
