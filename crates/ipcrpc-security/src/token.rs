//! HMAC-SHA256 signed, time-boxed auth tokens.
//!
//! Token format: `<canonical-json-claims>|<hex-hmac-sha256>`. Claims are
//! serialized with sorted keys and no whitespace, and always carry a
//! `timestamp` (unix seconds) set when the token is minted.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::{Result, SecurityError};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEX_LEN: usize = 64;

/// Signs and verifies auth tokens with a shared secret.
#[derive(Clone)]
pub struct TokenAuthenticator {
    secret: Vec<u8>,
}

impl TokenAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Mint a token for `claims`, stamped with the current time.
    pub fn generate_token(&self, claims: Map<String, Value>) -> String {
        self.generate_token_at(claims, unix_now())
    }

    /// Mint a token with an explicit `timestamp` claim.
    pub fn generate_token_at(&self, mut claims: Map<String, Value>, timestamp: i64) -> String {
        claims.insert("timestamp".to_string(), Value::from(timestamp));
        // serde_json maps are key-ordered, so this is the canonical form.
        let payload = Value::Object(claims).to_string();
        let signature = hex::encode(self.mac(payload.as_bytes()).finalize().into_bytes());
        format!("{payload}|{signature}")
    }

    /// Verify signature and age. Returns the claims on success.
    pub fn verify_token(&self, token: &str, max_age: Duration) -> Result<Map<String, Value>> {
        self.verify_token_at(token, max_age, unix_now())
    }

    /// [`verify_token`](Self::verify_token) against an explicit clock reading.
    pub fn verify_token_at(
        &self,
        token: &str,
        max_age: Duration,
        now: i64,
    ) -> Result<Map<String, Value>> {
        let (payload, signature) = token.rsplit_once('|').ok_or(SecurityError::TokenFormat)?;

        // Only the canonical lowercase encoding is accepted so that a token
        // has exactly one valid spelling.
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(SecurityError::InvalidSignature);
        }
        let signature = hex::decode(signature).map_err(|_| SecurityError::InvalidSignature)?;
        self.mac(payload.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| SecurityError::InvalidSignature)?;

        let claims = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(claims)) => claims,
            _ => return Err(SecurityError::TokenPayload),
        };
        let timestamp = claims
            .get("timestamp")
            .and_then(Value::as_i64)
            .ok_or(SecurityError::MissingTimestamp)?;

        let age = now.saturating_sub(timestamp);
        let max_age_secs = max_age.as_secs();
        if age > i64::try_from(max_age_secs).unwrap_or(i64::MAX) {
            return Err(SecurityError::Expired {
                age,
                max_age: max_age_secs,
            });
        }
        Ok(claims)
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(payload);
        mac
    }
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field(
                "secret",
                &format_args!("<redacted:{} bytes>", self.secret.len()),
            )
            .finish()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
