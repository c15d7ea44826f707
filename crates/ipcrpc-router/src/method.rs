use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::args::Args;
use crate::error::Result;

/// Future returned by a handler.
pub type HandlerFuture = LocalBoxFuture<'static, Result<Value>>;

/// Uniform handler signature: bound arguments in, JSON result out.
pub type Handler = Rc<dyn Fn(Args) -> HandlerFuture>;

/// Wrap an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Args) -> Fut + 'static,
    Fut: Future<Output = Result<Value>> + 'static,
{
    Rc::new(move |args| f(args).boxed_local())
}

/// Wrap a synchronous function as a [`Handler`].
///
/// The function runs when the returned future is first polled.
pub fn sync_fn<F>(f: F) -> Handler
where
    F: Fn(Args) -> Result<Value> + 'static,
{
    let f = Rc::new(f);
    Rc::new(move |args| {
        let f = Rc::clone(&f);
        async move { f(args) }.boxed_local()
    })
}

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

impl From<&str> for ParamSpec {
    fn from(name: &str) -> Self {
        Self::required(name)
    }
}

/// A registered method and its metadata.
#[derive(Clone)]
pub struct MethodInfo {
    pub name: String,
    pub handler: Handler,
    /// Owning service.
    pub service: String,
    pub description: Option<String>,
    /// Declared parameters. `None` passes params through unchecked.
    pub parameters: Option<Vec<ParamSpec>>,
    pub is_async: bool,
    pub requires_auth: bool,
    pub permissions: BTreeSet<String>,
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("is_async", &self.is_async)
            .field("requires_auth", &self.requires_auth)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// Builder for a method registration.
///
/// ```ignore
/// let add = MethodSpec::sync("add", |args| {
///     let a: i64 = args.value(0)?;
///     let b: i64 = args.value(1)?;
///     Ok(json!(a + b))
/// })
/// .params(["a", "b"]);
/// ```
#[derive(Clone)]
pub struct MethodSpec {
    name: String,
    handler: Handler,
    is_async: bool,
    description: Option<String>,
    parameters: Option<Vec<ParamSpec>>,
    requires_auth: bool,
    permissions: BTreeSet<String>,
}

impl MethodSpec {
    /// Register an async handler.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + 'static,
        Fut: Future<Output = Result<Value>> + 'static,
    {
        Self::from_handler(name, handler_fn(f), true)
    }

    /// Register a synchronous handler.
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value> + 'static,
    {
        Self::from_handler(name, sync_fn(f), false)
    }

    pub fn from_handler(name: impl Into<String>, handler: Handler, is_async: bool) -> Self {
        Self {
            name: name.into(),
            handler,
            is_async,
            description: None,
            parameters: None,
            requires_auth: false,
            permissions: BTreeSet::new(),
        }
    }

    /// Declare the parameter list used for positional and named binding.
    pub fn params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParamSpec>,
    {
        self.parameters = Some(params.into_iter().map(Into::into).collect());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    /// Permissions the caller must hold. Implies nothing about `requires_auth`.
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_info(self, name: String, service: &str) -> MethodInfo {
        MethodInfo {
            name,
            handler: self.handler,
            service: service.to_string(),
            description: self.description,
            parameters: self.parameters,
            is_async: self.is_async,
            requires_auth: self.requires_auth,
            permissions: self.permissions,
        }
    }
}

/// A named group of methods registered together.
#[derive(Clone)]
pub struct Service {
    name: String,
    prefix: Option<String>,
    methods: Vec<MethodSpec>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            methods: Vec::new(),
        }
    }

    /// Register every method as `<prefix>.<name>`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn method(mut self, spec: MethodSpec) -> Self {
        self.methods.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, Vec<(String, MethodSpec)>) {
        let prefix = self.prefix;
        let methods = self
            .methods
            .into_iter()
            .map(|spec| {
                let full = match &prefix {
                    Some(prefix) => format!("{prefix}.{}", spec.name),
                    None => spec.name.clone(),
                };
                (full, spec)
            })
            .collect();
        (self.name, methods)
    }
}
