use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::error::{InboundError, Result, SecurityError, ValidationError};
use crate::rate_limit::RateLimiter;
use crate::token::TokenAuthenticator;
use crate::validator::InputValidator;

/// Security gate applied to every inbound message.
#[derive(Debug)]
pub struct IpcSecurity {
    config: SecurityConfig,
    rate_limiter: RateLimiter,
    validator: InputValidator,
    authenticator: Option<TokenAuthenticator>,
}

impl IpcSecurity {
    pub fn new(config: SecurityConfig) -> Self {
        let authenticator = config.auth_secret.as_deref().map(TokenAuthenticator::new);
        Self {
            rate_limiter: RateLimiter::per_minute(config.max_requests_per_minute),
            validator: InputValidator::new(&config),
            authenticator,
            config,
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Whether peers must authenticate before calling methods.
    pub fn auth_required(&self) -> bool {
        self.config.require_auth && self.authenticator.is_some()
    }

    /// Rate, size, parse, structure, method and params checks, in that order.
    ///
    /// Returns the parsed message. Violations are logged with the peer id and
    /// violation kind.
    pub fn validate_incoming_message(
        &mut self,
        raw: &str,
        peer_id: &str,
    ) -> std::result::Result<Value, InboundError> {
        let result = self.validate_inner(raw, peer_id);
        if let Err(err) = &result {
            warn!(peer_id = %peer_id, violation = err.kind(), error = %err, "inbound message refused");
        }
        result
    }

    fn validate_inner(
        &mut self,
        raw: &str,
        peer_id: &str,
    ) -> std::result::Result<Value, InboundError> {
        if !self.rate_limiter.check(peer_id) {
            return Err(SecurityError::RateLimited.into());
        }
        self.validator.validate_message_size(raw)?;

        let data: Value = serde_json::from_str(raw)
            .map_err(|err| ValidationError::InvalidJson(err.to_string()))?;

        if self.config.validate_structure {
            self.validator.validate_structure(&data)?;
        }

        if let Some(method) = data.get("method") {
            let method = method.as_str().ok_or(ValidationError::MethodNotString)?;
            self.validator.validate_method_name(method)?;
            if let Some(params) = data.get("params") {
                self.validator.validate_parameters(params)?;
            }
        }
        Ok(data)
    }

    /// Verify a token presented by a peer, using the configured max age.
    pub fn verify_token(&self, token: &str) -> Result<Map<String, Value>> {
        self.verify_token_with_age(token, self.config.token_max_age)
    }

    pub fn verify_token_with_age(
        &self,
        token: &str,
        max_age: Duration,
    ) -> Result<Map<String, Value>> {
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or(SecurityError::AuthNotConfigured)?;
        authenticator.verify_token(token, max_age)
    }

    /// Mint a token with `client_id` and `permissions` claims.
    pub fn generate_auth_token(&self, client_id: &str, permissions: &[String]) -> Result<String> {
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or(SecurityError::AuthNotConfigured)?;
        let mut claims = Map::new();
        claims.insert("client_id".to_string(), Value::from(client_id));
        claims.insert("permissions".to_string(), Value::from(permissions.to_vec()));
        Ok(authenticator.generate_token(claims))
    }

    /// Prune rate limiter state for peers that have gone quiet.
    pub fn cleanup(&mut self) {
        self.rate_limiter.cleanup_old_entries();
        debug!(
            tracked_peers = self.rate_limiter.tracked_peers(),
            "security state cleaned up"
        );
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
