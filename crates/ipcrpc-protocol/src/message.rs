use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::RpcError;

/// Protocol version carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request id: JSON-RPC allows integers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// A fresh random id (UUID v4 string).
    pub fn generate() -> Self {
        Self::String(uuid::Uuid::new_v4().to_string())
    }

    /// Interpret a JSON value as an id. `null` and other types yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Number),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A parsed JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// A call expecting exactly one response.
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// A call that never produces a response.
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// A successful response to an earlier request.
    Response { id: RequestId, result: Value },
    /// An error response; `id` is `None` when the request could not be read.
    Error {
        id: Option<RequestId>,
        error: RpcError,
    },
}

/// A message that could not be interpreted, with the reply it deserves.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidMessage {
    /// Id recovered from the envelope, if any.
    pub id: Option<RequestId>,
    pub error: RpcError,
    /// Whether an error response should be sent back. False for malformed
    /// notifications and responses, which are never answered.
    pub reply: bool,
}

impl InvalidMessage {
    fn reply(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            error,
            reply: true,
        }
    }

    fn silent(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            error,
            reply: false,
        }
    }
}

impl RpcMessage {
    /// Classify a parsed JSON value.
    ///
    /// An envelope with `method` is a request when it carries a non-null `id`
    /// and a notification otherwise; one with `result` or `error` is a
    /// response.
    pub fn from_value(value: Value) -> Result<Self, InvalidMessage> {
        let Value::Object(mut obj) = value else {
            return Err(InvalidMessage::reply(None, RpcError::invalid_request()));
        };

        let raw_id = obj.remove("id").unwrap_or(Value::Null);
        let id = RequestId::from_value(&raw_id);
        if !raw_id.is_null() && id.is_none() {
            return Err(InvalidMessage::reply(None, RpcError::invalid_request()));
        }

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(InvalidMessage::reply(id, RpcError::invalid_request()));
        }

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(InvalidMessage {
                    reply: id.is_some(),
                    id,
                    error: RpcError::invalid_request(),
                });
            };
            let params = match obj.remove("params") {
                None | Some(Value::Null) => None,
                Some(p @ (Value::Array(_) | Value::Object(_))) => Some(p),
                Some(_) => {
                    return Err(InvalidMessage {
                        reply: id.is_some(),
                        id,
                        error: RpcError::invalid_params("Invalid parameters"),
                    });
                }
            };
            return Ok(match id {
                Some(id) => Self::Request { id, method, params },
                None => Self::Notification { method, params },
            });
        }

        if let Some(error) = obj.remove("error") {
            return Ok(Self::Error {
                id,
                error: RpcError::from_value(&error),
            });
        }

        if let Some(result) = obj.remove("result") {
            return match id {
                Some(id) => Ok(Self::Response { id, result }),
                None => Err(InvalidMessage::silent(None, RpcError::invalid_request())),
            };
        }

        Err(InvalidMessage::reply(id, RpcError::invalid_request()))
    }

    /// Parse raw JSON text.
    pub fn parse(raw: &str) -> Result<Self, InvalidMessage> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| InvalidMessage::reply(None, RpcError::parse_error()))?;
        Self::from_value(value)
    }

    /// Render as a JSON-RPC envelope.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Self::Request { id, method, params } => {
                obj.insert("id".into(), id.to_value());
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Notification { method, params } => {
                obj.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params {
                    obj.insert("params".into(), params.clone());
                }
            }
            Self::Response { id, result } => {
                obj.insert("id".into(), id.to_value());
                obj.insert("result".into(), result.clone());
            }
            Self::Error { id, error } => {
                obj.insert(
                    "id".into(),
                    id.as_ref().map(RequestId::to_value).unwrap_or(Value::Null),
                );
                obj.insert("error".into(), error.to_value());
            }
        }
        Value::Object(obj)
    }

    /// Serialize to compact JSON text.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            _ => None,
        }
    }
}

/// Build a serialized request. A fresh id is generated when `id` is `None`.
pub fn create_request(method: &str, params: Option<Value>, id: Option<RequestId>) -> String {
    RpcMessage::Request {
        id: id.unwrap_or_else(RequestId::generate),
        method: method.to_string(),
        params,
    }
    .encode()
}

/// Build a serialized notification. Never carries an `id`.
pub fn create_notification(method: &str, params: Option<Value>) -> String {
    RpcMessage::Notification {
        method: method.to_string(),
        params,
    }
    .encode()
}

/// Build a serialized success response.
pub fn create_response(id: &RequestId, result: Value) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.to_value(),
        "result": result,
    })
    .to_string()
}

/// Build a serialized error response. Use `None` when the request id is
/// unknown (parse errors).
pub fn create_error_response(id: Option<&RequestId>, error: &RpcError) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.map(RequestId::to_value),
        "error": error.to_value(),
    })
    .to_string()
}
