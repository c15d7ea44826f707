use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::SecurityConfig;
use crate::error::{Result, SecurityError};

/// Substrings that mark a method name as an attempt to reach interpreter
/// internals, code execution, or the filesystem. Matched case-insensitively.
pub const DANGEROUS_METHOD_PATTERNS: &[&str] =
    &["__", "exec", "eval", "import", "open", "file", "system"];

/// Parameter names refused outright.
pub const DANGEROUS_PARAM_KEYS: &[&str] = &["__class__", "__module__", "__globals__", "func_code"];

/// Structural and naming checks for inbound JSON-RPC traffic.
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_payload_size: usize,
    max_string_length: usize,
    max_array_length: usize,
    max_object_depth: usize,
    allowed_methods: Option<BTreeSet<String>>,
    blocked_methods: BTreeSet<String>,
    check_structure: bool,
}

impl InputValidator {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
            max_string_length: config.max_string_length,
            max_array_length: config.max_array_length,
            max_object_depth: config.max_object_depth,
            allowed_methods: config
                .allowed_methods
                .clone()
                .filter(|allowed| !allowed.is_empty()),
            blocked_methods: config.blocked_methods.clone(),
            check_structure: config.validate_structure,
        }
    }

    /// Reject raw messages larger than the payload cap (UTF-8 bytes).
    pub fn validate_message_size(&self, raw: &str) -> Result<()> {
        if raw.len() > self.max_payload_size {
            return Err(SecurityError::PayloadTooLarge {
                size: raw.len(),
                max: self.max_payload_size,
            });
        }
        Ok(())
    }

    /// Walk a parsed value enforcing depth, string, key and array caps.
    ///
    /// The root sits at depth 0 and each enclosing array or object adds one,
    /// so a scalar wrapped in `max_object_depth` objects is accepted and one
    /// more level is rejected.
    pub fn validate_structure(&self, value: &Value) -> Result<()> {
        self.walk(value, 0)
    }

    fn walk(&self, value: &Value, depth: usize) -> Result<()> {
        if depth > self.max_object_depth {
            return Err(SecurityError::TooDeep {
                depth,
                max: self.max_object_depth,
            });
        }
        match value {
            Value::String(s) => {
                let len = s.chars().count();
                if len > self.max_string_length {
                    return Err(SecurityError::StringTooLong {
                        len,
                        max: self.max_string_length,
                    });
                }
            }
            Value::Array(items) => {
                if items.len() > self.max_array_length {
                    return Err(SecurityError::ArrayTooLong {
                        len: items.len(),
                        max: self.max_array_length,
                    });
                }
                for item in items {
                    self.walk(item, depth + 1)?;
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let len = key.chars().count();
                    if len > self.max_string_length {
                        return Err(SecurityError::KeyTooLong {
                            len,
                            max: self.max_string_length,
                        });
                    }
                    self.walk(item, depth + 1)?;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    /// Apply the block-list, the allow-list, and the dangerous-name heuristic.
    pub fn validate_method_name(&self, method: &str) -> Result<()> {
        if self.blocked_methods.contains(method) {
            return Err(SecurityError::MethodBlocked(method.to_string()));
        }
        if let Some(allowed) = &self.allowed_methods {
            if !allowed.contains(method) {
                return Err(SecurityError::MethodNotAllowed(method.to_string()));
            }
        }
        let lower = method.to_lowercase();
        if DANGEROUS_METHOD_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Err(SecurityError::DangerousMethod(method.to_string()));
        }
        Ok(())
    }

    /// Structural check plus the reserved parameter-name check. The
    /// structural walk follows `validate_structure` in the config; reserved
    /// names are always refused.
    pub fn validate_parameters(&self, params: &Value) -> Result<()> {
        if params.is_null() {
            return Ok(());
        }
        if self.check_structure {
            self.validate_structure(params)?;
        }
        if let Value::Object(map) = params {
            if let Some(key) = map
                .keys()
                .find(|key| DANGEROUS_PARAM_KEYS.contains(&key.as_str()))
            {
                return Err(SecurityError::DangerousParameter(key.clone()));
            }
        }
        Ok(())
    }
}
