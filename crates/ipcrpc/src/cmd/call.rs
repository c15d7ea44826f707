use std::time::Instant;

use ipcrpc_manager::{IpcManager, ManagerConfig};

use crate::cmd::{parse_duration, parse_params, CallArgs};
use crate::exit::{ipc_error, CliResult, SUCCESS};
use crate::output::{print_call_result, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.params.as_deref())?;

    let mut config = ManagerConfig::new("ipcrpc-cli");
    config.transport.security_token = args.token;
    config.request_timeout = timeout;
    let client = IpcManager::new(config);
    client
        .connect_to_server(&args.address)
        .await
        .map_err(|err| ipc_error("connect failed", err))?;

    let started = Instant::now();
    let outcome = client.call_method(&args.method, params, Some(timeout)).await;
    let elapsed_ms = started.elapsed().as_millis();
    let _ = client.shutdown().await;

    let result = outcome.map_err(|err| ipc_error(&format!("{} failed", args.method), err))?;
    print_call_result(&args.method, &result, elapsed_ms, format);
    Ok(SUCCESS)
}
