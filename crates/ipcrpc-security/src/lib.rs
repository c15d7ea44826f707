//! Security layer for ipcrpc.
//!
//! Applied to every inbound message before it reaches the protocol engine:
//! per-peer rate limiting, payload size and JSON structure caps, method
//! allow/block lists with a dangerous-name heuristic, and HMAC-signed
//! time-boxed tokens for authenticating peers.
//!
//! The method-name heuristic is defense in depth. Handlers still have to be
//! registered with the permissions they need.

pub mod config;
pub mod error;
pub mod policy;
pub mod rate_limit;
pub mod token;
pub mod validator;

pub use config::SecurityConfig;
pub use error::{InboundError, Result, SecurityError, ValidationError};
pub use policy::IpcSecurity;
pub use rate_limit::RateLimiter;
pub use token::TokenAuthenticator;
pub use validator::InputValidator;
