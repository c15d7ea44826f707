use std::fs;
use std::path::Path;
use std::time::Duration;

use ipcrpc_manager::{IpcManager, ManagerConfig};
use ipcrpc_router::{Args, MethodSpec, Service};
use ipcrpc_security::SecurityConfig;
use serde_json::{json, Value};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{io_error, ipc_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_server_info, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = build_config(&args)?;
    let manager = IpcManager::new(config);
    manager
        .register_service(demo_service())
        .map_err(|err| ipc_error("register failed", err))?;
    manager
        .start_server()
        .map_err(|err| ipc_error("start failed", err))?;
    print_server_info(&manager.info(), format);

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| io_error("failed to wait for interrupt", err))?;
    info!("interrupt received, shutting down");

    manager
        .shutdown()
        .await
        .map_err(|err| ipc_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

fn build_config(args: &ServeArgs) -> CliResult<ManagerConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ManagerConfig::default(),
    };
    config.transport.name = args.name.clone();
    if let Some(dir) = &args.dir {
        config.transport.directory = Some(dir.clone());
    }
    if let Some(max) = args.max_connections {
        config.transport.max_connections = max;
    }
    if let Some(secret) = &args.secret {
        let base = config.security.take().unwrap_or_default();
        config.security = Some(SecurityConfig {
            auth_secret: Some(secret.clone()),
            require_auth: true,
            ..base
        });
    }
    Ok(config)
}

fn load_config(path: &Path) -> CliResult<ManagerConfig> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

/// `demo.echo`, `demo.add` and `demo.sleep`.
fn demo_service() -> Service {
    Service::new("demo")
        .with_prefix("demo")
        .method(
            MethodSpec::sync("echo", |args| Ok(args.get(0).cloned().unwrap_or(Value::Null)))
                .params(["value"])
                .description("Return the first parameter"),
        )
        .method(
            MethodSpec::sync("add", add)
                .params(["a", "b"])
                .description("Sum two numbers"),
        )
        .method(
            MethodSpec::new("sleep", |args| async move {
                let ms: u64 = args.value(0)?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!(ms))
            })
            .params(["ms"])
            .description("Reply after the given number of milliseconds"),
        )
}

fn add(args: Args) -> ipcrpc_router::Result<Value> {
    if let (Ok(a), Ok(b)) = (args.value::<i64>(0), args.value::<i64>(1)) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(json!(sum));
        }
    }
    let a: f64 = args.value(0)?;
    let b: f64 = args.value(1)?;
    Ok(json!(a + b))
}
