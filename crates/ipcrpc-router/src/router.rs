use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use async_trait::async_trait;
use futures_util::FutureExt;
use ipcrpc_protocol::{CallContext, Dispatch, ErrorCode, RpcError};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::args::Args;
use crate::method::{MethodInfo, MethodSpec, Service};
use crate::registry::{ServiceInfo, ServiceRegistry};

/// Runs before access checks; an `Err` short-circuits the call.
pub type RequestMiddleware = Rc<dyn Fn(&str, Option<&Value>, &CallContext) -> Result<(), RpcError>>;
/// Runs on a successful result; an `Err` replaces it.
pub type ResponseMiddleware = Rc<dyn Fn(&str, &Value, &CallContext) -> Result<(), RpcError>>;
/// Observes every routing failure before it is returned.
pub type ErrorHook = Rc<dyn Fn(&str, &RpcError, &CallContext)>;

/// Routes calls to registered handlers.
///
/// Shared through `Rc`; registration takes `&self` so methods can be added
/// while the manager is running.
#[derive(Default)]
pub struct MessageRouter {
    registry: RefCell<ServiceRegistry>,
    request_middleware: RefCell<Vec<RequestMiddleware>>,
    response_middleware: RefCell<Vec<ResponseMiddleware>>,
    error_hooks: RefCell<Vec<ErrorHook>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service(&self, service: Service) {
        self.registry.borrow_mut().register_service(service);
    }

    pub fn register_method(&self, spec: MethodSpec, service: &str) {
        self.registry.borrow_mut().register_method(spec, service);
    }

    pub fn unregister_service(&self, service: &str) -> bool {
        self.registry.borrow_mut().unregister_service(service)
    }

    pub fn unregister_method(&self, name: &str) -> bool {
        self.registry.borrow_mut().unregister_method(name)
    }

    pub fn get_method(&self, name: &str) -> Option<MethodInfo> {
        self.registry.borrow().get_method(name).cloned()
    }

    pub fn list_methods(&self, service: Option<&str>) -> Vec<MethodInfo> {
        self.registry.borrow().list_methods(service)
    }

    pub fn list_services(&self) -> Vec<String> {
        self.registry.borrow().list_services()
    }

    pub fn get_service_info(&self, service: &str) -> Option<ServiceInfo> {
        self.registry.borrow().get_service_info(service)
    }

    pub fn add_request_middleware<F>(&self, middleware: F)
    where
        F: Fn(&str, Option<&Value>, &CallContext) -> Result<(), RpcError> + 'static,
    {
        self.request_middleware
            .borrow_mut()
            .push(Rc::new(middleware));
    }

    pub fn add_response_middleware<F>(&self, middleware: F)
    where
        F: Fn(&str, &Value, &CallContext) -> Result<(), RpcError> + 'static,
    {
        self.response_middleware
            .borrow_mut()
            .push(Rc::new(middleware));
    }

    pub fn add_error_hook<F>(&self, hook: F)
    where
        F: Fn(&str, &RpcError, &CallContext) + 'static,
    {
        self.error_hooks.borrow_mut().push(Rc::new(hook));
    }

    /// Resolve `method`, run middleware and access checks, bind params and
    /// invoke the handler.
    ///
    /// Every failure comes back as an [`RpcError`]; handler panics are
    /// reported as Internal Error.
    pub async fn route_message(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        let result = self.route_inner(method, params, ctx).await;
        if let Err(err) = &result {
            self.report(method, err, ctx);
        }
        result
    }

    async fn route_inner(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        let info = self
            .get_method(method)
            .ok_or_else(|| RpcError::method_not_found(method))?;

        let request_middleware = self.request_middleware.borrow().clone();
        for middleware in &request_middleware {
            middleware(method, params.as_ref(), ctx)?;
        }

        check_access(&info, ctx)?;

        let args = Args::bind(method, info.parameters.as_deref(), params, ctx.clone())
            .map_err(|err| err.into_rpc_error())?;

        let handler = Rc::clone(&info.handler);
        let outcome = AssertUnwindSafe(async move { handler(args).await })
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => return Err(err.into_rpc_error()),
            Err(_) => {
                error!(%method, "handler panicked");
                return Err(RpcError::internal("Internal error"));
            }
        };

        let response_middleware = self.response_middleware.borrow().clone();
        for middleware in &response_middleware {
            middleware(method, &result, ctx)?;
        }
        debug!(%method, peer_id = ?ctx.peer_id, "routed call");
        Ok(result)
    }

    fn report(&self, method: &str, err: &RpcError, ctx: &CallContext) {
        match err.code {
            ErrorCode::InternalError => {
                error!(%method, peer_id = ?ctx.peer_id, error = %err, "method failed");
            }
            ErrorCode::MethodNotFound => {
                debug!(%method, peer_id = ?ctx.peer_id, "method not found");
            }
            _ => warn!(%method, peer_id = ?ctx.peer_id, error = %err, "method failed"),
        }

        let hooks = self.error_hooks.borrow().clone();
        for hook in hooks {
            let call = AssertUnwindSafe(|| hook(method, err, ctx));
            if std::panic::catch_unwind(call).is_err() {
                error!(%method, "error hook panicked");
            }
        }
    }
}

fn check_access(info: &MethodInfo, ctx: &CallContext) -> Result<(), RpcError> {
    if info.requires_auth && !ctx.authenticated {
        return Err(RpcError::permission_denied("Authentication required"));
    }
    let missing = ctx.missing_permissions(&info.permissions);
    if !missing.is_empty() {
        return Err(RpcError::permission_denied(format!(
            "Insufficient permissions. Missing: {missing:?}"
        ))
        .with_data(serde_json::json!({ "missing": missing })));
    }
    Ok(())
}

#[async_trait(?Send)]
impl Dispatch for MessageRouter {
    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        self.route_message(method, params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::error::HandlerError;

    fn router() -> MessageRouter {
        let router = MessageRouter::new();
        router.register_service(
            Service::new("demo")
                .method(MethodSpec::sync("echo", |args| Ok(args.get(0).cloned().unwrap_or(Value::Null))))
                .method(
                    MethodSpec::sync("add", |args| {
                        let a: i64 = args.value(0)?;
                        let b: i64 = args.value(1)?;
                        Ok(json!(a + b))
                    })
                    .params(["a", "b"]),
                )
                .method(MethodSpec::new("slow.echo", |args| async move {
                    tokio::task::yield_now().await;
                    Ok(args.get(0).cloned().unwrap_or(Value::Null))
                }))
                .method(
                    MethodSpec::sync("secret", |_| Ok(json!("classified")))
                        .requires_auth(true)
                        .permissions(["admin", "read"]),
                )
                .method(MethodSpec::sync("fails", |_| {
                    Err(HandlerError::internal("disk on fire"))
                }))
                .method(MethodSpec::sync("panics", |_| panic!("boom"))),
        );
        router
    }

    #[tokio::test]
    async fn add_binds_positional_and_named() {
        let router = router();
        let ctx = CallContext::default();
        assert_eq!(
            router.route_message("add", Some(json!([5, 3])), &ctx).await.unwrap(),
            json!(8)
        );
        assert_eq!(
            router
                .route_message("add", Some(json!({"a": 5, "b": 3})), &ctx)
                .await
                .unwrap(),
            json!(8)
        );
    }

    #[tokio::test]
    async fn async_handler_is_awaited() {
        let router = router();
        let result = router
            .route_message("slow.echo", Some(json!(["hi"])), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn unknown_method_names_the_method() {
        let router = router();
        let err = router
            .route_message("x.y", None, &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert!(err.message.contains("x.y"));
    }

    #[tokio::test]
    async fn auth_and_permissions_enforced() {
        let router = router();
        let err = router
            .route_message("secret", None, &CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.message, "Authentication required");

        let partial = CallContext::for_peer("p").authenticated(["read"]);
        let err = router.route_message("secret", None, &partial).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert!(err.message.contains("admin"));
        assert!(!err.message.contains("read\""));
        assert_eq!(err.data, Some(json!({"missing": ["admin"]})));

        let full = CallContext::for_peer("p").authenticated(["read", "admin"]);
        assert_eq!(
            router.route_message("secret", None, &full).await.unwrap(),
            json!("classified")
        );
    }

    #[tokio::test]
    async fn handler_errors_are_translated() {
        let router = router();
        let ctx = CallContext::default();

        let err = router
            .route_message("add", Some(json!(["five", 3])), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);

        let err = router.route_message("fails", None, &ctx).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "Internal error: disk on fire");

        let err = router.route_message("panics", None, &ctx).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("boom"));
    }

    #[tokio::test]
    async fn request_middleware_can_short_circuit() {
        let router = router();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        router.add_request_middleware(move |method, _params, _ctx| {
            seen.set(seen.get() + 1);
            if method == "echo" {
                Err(RpcError::permission_denied("echo disabled"))
            } else {
                Ok(())
            }
        });

        let ctx = CallContext::default();
        let err = router
            .route_message("echo", Some(json!([1])), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.message, "echo disabled");
        assert!(router.route_message("add", Some(json!([1, 2])), &ctx).await.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn response_middleware_sees_results() {
        let router = router();
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        router.add_response_middleware(move |method, result, _ctx| {
            sink.borrow_mut().push((method.to_string(), result.clone()));
            Ok(())
        });

        router
            .route_message("add", Some(json!([2, 2])), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(results.borrow().as_slice(), &[("add".to_string(), json!(4))]);
    }

    #[tokio::test]
    async fn error_hooks_observe_failures() {
        let router = router();
        let codes = Rc::new(RefCell::new(Vec::new()));
        let sink = codes.clone();
        router.add_error_hook(move |method, err, _ctx| {
            sink.borrow_mut().push((method.to_string(), err.code));
        });
        router.add_error_hook(|_, _, _| panic!("hook bug"));

        let ctx = CallContext::default();
        let _ = router.route_message("missing", None, &ctx).await;
        let _ = router.route_message("fails", None, &ctx).await;
        assert!(router.route_message("echo", None, &ctx).await.is_ok());

        assert_eq!(
            codes.borrow().as_slice(),
            &[
                ("missing".to_string(), ErrorCode::MethodNotFound),
                ("fails".to_string(), ErrorCode::InternalError),
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_goes_through_router() {
        let router: Rc<dyn Dispatch> = Rc::new(router());
        let result = router
            .dispatch("add", Some(json!([1, 1])), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(result, json!(2));
    }
}
