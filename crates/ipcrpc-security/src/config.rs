use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Default requests per peer per minute.
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: usize = 100;
/// Default maximum raw message size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;
/// Default maximum string (and object key) length in characters.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 10_000;
/// Default maximum array length.
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1_000;
/// Default maximum JSON nesting depth.
pub const DEFAULT_MAX_OBJECT_DEPTH: usize = 10;
/// Default maximum age accepted for an auth token.
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(3600);

/// Security policy for inbound IPC traffic.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_requests_per_minute: usize,
    /// Maximum raw message size in UTF-8 bytes.
    pub max_payload_size: usize,
    /// Require peers to authenticate before calling methods.
    pub require_auth: bool,
    /// Shared HMAC secret for auth tokens. Auth is only enforced when set.
    pub auth_secret: Option<String>,
    /// When present and non-empty, only these methods may be called. An empty
    /// set is treated as no allow-list.
    pub allowed_methods: Option<BTreeSet<String>>,
    pub blocked_methods: BTreeSet<String>,
    /// Walk parsed JSON and enforce depth/length caps. Covers the whole
    /// envelope, params included.
    pub validate_structure: bool,
    pub max_string_length: usize,
    pub max_array_length: usize,
    pub max_object_depth: usize,
    #[serde(rename = "token_max_age_secs", with = "duration_secs")]
    pub token_max_age: Duration,
}

impl SecurityConfig {
    /// Defaults plus a shared secret and a block-list of execution primitives.
    pub fn secure(secret: impl Into<String>) -> Self {
        Self {
            auth_secret: Some(secret.into()),
            require_auth: true,
            blocked_methods: [
                "__import__",
                "exec",
                "eval",
                "compile",
                "open",
                "__builtins__",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ..Self::default()
        }
    }

    /// Whether unauthenticated peers must be refused.
    pub fn auth_enforced(&self) -> bool {
        self.require_auth && self.auth_secret.is_some()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            require_auth: true,
            auth_secret: None,
            allowed_methods: None,
            blocked_methods: BTreeSet::new(),
            validate_structure: true,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            max_object_depth: DEFAULT_MAX_OBJECT_DEPTH,
            token_max_age: DEFAULT_TOKEN_MAX_AGE,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("SecurityConfig");
        dbg.field("max_requests_per_minute", &self.max_requests_per_minute)
            .field("max_payload_size", &self.max_payload_size)
            .field("require_auth", &self.require_auth);
        if let Some(secret) = &self.auth_secret {
            dbg.field(
                "auth_secret",
                &format_args!("<redacted:{} bytes>", secret.len()),
            );
        } else {
            dbg.field("auth_secret", &Option::<String>::None);
        }
        dbg.field("allowed_methods", &self.allowed_methods)
            .field("blocked_methods", &self.blocked_methods)
            .field("validate_structure", &self.validate_structure)
            .field("max_string_length", &self.max_string_length)
            .field("max_array_length", &self.max_array_length)
            .field("max_object_depth", &self.max_object_depth)
            .field("token_max_age", &self.token_max_age)
            .finish()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
