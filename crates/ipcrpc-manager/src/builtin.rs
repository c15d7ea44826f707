use std::rc::{Rc, Weak};

use ipcrpc_protocol::RpcError;
use ipcrpc_router::{HandlerError, MessageRouter, MethodSpec, Service};
use serde_json::{json, Map, Value};

use crate::manager::Shared;

/// Service name reserved for the methods below.
pub const IPC_SERVICE: &str = "ipc";

/// Methods an unauthenticated peer may still call when auth is enforced.
pub const UNAUTHENTICATED_METHODS: &[&str] = &["ipc.authenticate", "ipc.ping"];

/// `ipc.ping`, `ipc.describe` and `ipc.authenticate`.
pub(crate) fn service(shared: Weak<Shared>) -> Service {
    let for_describe = shared.clone();
    Service::new(IPC_SERVICE)
        .with_prefix(IPC_SERVICE)
        .method(MethodSpec::sync("ping", |_| Ok(json!("pong"))).description("Liveness check"))
        .method(
            MethodSpec::sync("describe", move |_| {
                let shared = upgrade(&for_describe)?;
                Ok(describe(shared.router()))
            })
            .description("List registered services and their methods"),
        )
        .method(
            MethodSpec::sync("authenticate", move |args| {
                let token: String = args.value(0)?;
                let shared = upgrade(&shared)?;
                shared.authenticate(args.context(), &token)
            })
            .params(["token"])
            .description("Present an auth token for this connection"),
        )
}

/// Refuse every call from an unauthenticated peer except the exempt methods.
pub(crate) fn install_auth_gate(router: &MessageRouter) {
    router.add_request_middleware(|method, _params, ctx| {
        if ctx.authenticated || UNAUTHENTICATED_METHODS.contains(&method) {
            Ok(())
        } else {
            Err(RpcError::permission_denied("Authentication required"))
        }
    });
}

fn describe(router: &MessageRouter) -> Value {
    let mut services = Map::new();
    for name in router.list_services() {
        if let Some(info) = router.get_service_info(&name) {
            services.insert(name, serde_json::to_value(info).unwrap_or(Value::Null));
        }
    }
    json!({ "services": services })
}

fn upgrade(shared: &Weak<Shared>) -> Result<Rc<Shared>, HandlerError> {
    shared
        .upgrade()
        .ok_or_else(|| HandlerError::internal("manager has shut down"))
}
