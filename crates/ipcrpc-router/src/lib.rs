//! Service registry and message router for ipcrpc.
//!
//! Methods are registered explicitly with [`MethodSpec`] (name, handler,
//! auth requirement, permissions, declared parameters) either one at a time or
//! grouped into a [`Service`]. The [`MessageRouter`] resolves a name, runs
//! middleware, enforces auth and permissions, binds params positionally or by
//! name, invokes the handler and translates every failure into an
//! [`RpcError`](ipcrpc_protocol::RpcError).

pub mod args;
pub mod error;
pub mod method;
pub mod registry;
pub mod router;

pub use args::Args;
pub use error::{HandlerError, Result};
pub use method::{handler_fn, sync_fn, Handler, HandlerFuture, MethodInfo, MethodSpec, ParamSpec, Service};
pub use registry::{MethodSummary, ServiceInfo, ServiceRegistry, DEFAULT_SERVICE};
pub use router::{ErrorHook, MessageRouter, RequestMiddleware, ResponseMiddleware};
