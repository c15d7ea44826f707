use ipcrpc_protocol::CallContext;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{HandlerError, Result};
use crate::method::ParamSpec;

/// Arguments bound for one handler invocation.
///
/// With declared parameters, positional and named params are both bound into
/// declaration order, so `args.value(0)` works either way. Without a
/// declaration, arrays bind positionally and objects stay available through
/// [`named`](Self::named).
#[derive(Debug, Clone, Default)]
pub struct Args {
    method: String,
    names: Vec<String>,
    values: Vec<Value>,
    named: Option<Map<String, Value>>,
    context: CallContext,
}

impl Args {
    /// Bind `params` for `method` against its declared parameter list.
    pub fn bind(
        method: &str,
        declared: Option<&[ParamSpec]>,
        params: Option<Value>,
        context: CallContext,
    ) -> Result<Self> {
        let mut args = Self {
            method: method.to_string(),
            context,
            ..Self::default()
        };

        let Some(declared) = declared else {
            match params {
                None | Some(Value::Null) => {}
                Some(Value::Array(values)) => args.values = values,
                Some(Value::Object(map)) => args.named = Some(map),
                Some(_) => return Err(not_array_or_object()),
            }
            return Ok(args);
        };

        args.names = declared.iter().map(|p| p.name.clone()).collect();
        args.values = match params {
            None | Some(Value::Null) => {
                let mut values = Vec::with_capacity(declared.len());
                for spec in declared {
                    if spec.required {
                        return Err(args.missing(&spec.name));
                    }
                    values.push(Value::Null);
                }
                values
            }
            Some(Value::Array(mut values)) => {
                if values.len() > declared.len() {
                    return Err(HandlerError::invalid_params(format!(
                        "Invalid parameters for {method}: expected at most {} arguments, got {}",
                        declared.len(),
                        values.len()
                    )));
                }
                if let Some(spec) = declared[values.len()..].iter().find(|p| p.required) {
                    return Err(args.missing(&spec.name));
                }
                values.resize(declared.len(), Value::Null);
                values
            }
            Some(Value::Object(mut map)) => {
                let mut values = Vec::with_capacity(declared.len());
                for spec in declared {
                    match map.remove(&spec.name) {
                        Some(value) => values.push(value),
                        None if spec.required => return Err(args.missing(&spec.name)),
                        None => values.push(Value::Null),
                    }
                }
                if let Some(unexpected) = map.keys().next() {
                    return Err(HandlerError::invalid_params(format!(
                        "Invalid parameters for {method}: unexpected parameter '{unexpected}'"
                    )));
                }
                values
            }
            Some(_) => return Err(not_array_or_object()),
        };
        Ok(args)
    }

    fn missing(&self, name: &str) -> HandlerError {
        HandlerError::invalid_params(format!(
            "Invalid parameters for {}: missing required parameter '{name}'",
            self.method
        ))
    }

    /// Raw positional value.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Deserialize a required positional value.
    pub fn value<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        match self.values.get(index) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| self.type_error(index, &err.to_string())),
            None => Err(self.type_error(index, "missing")),
        }
    }

    /// Deserialize an optional positional value; missing and `null` give `None`.
    pub fn optional<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| self.type_error(index, &err.to_string())),
        }
    }

    /// Deserialize a value by parameter name, from declared or named params.
    pub fn by_name<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return self.value(index);
        }
        match self.named.as_ref().and_then(|map| map.get(name)) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                HandlerError::invalid_params(format!(
                    "Invalid parameters for {}: '{name}': {err}",
                    self.method
                ))
            }),
            None => Err(self.missing(name)),
        }
    }

    fn type_error(&self, index: usize, detail: &str) -> HandlerError {
        let label = match self.names.get(index) {
            Some(name) => format!("'{name}'"),
            None => format!("#{index}"),
        };
        HandlerError::invalid_params(format!(
            "Invalid parameters for {}: argument {label}: {detail}",
            self.method
        ))
    }

    /// Named params passed to a method without a declared parameter list.
    pub fn named(&self) -> Option<&Map<String, Value>> {
        self.named.as_ref()
    }

    /// Number of positional values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.named.as_ref().is_none_or(Map::is_empty)
    }

    /// The caller's context.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

fn not_array_or_object() -> HandlerError {
    HandlerError::invalid_params("Parameters must be array or object")
}
