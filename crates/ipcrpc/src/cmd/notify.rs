use ipcrpc_manager::{IpcManager, ManagerConfig};
use tracing::debug;

use crate::cmd::{parse_params, NotifyArgs};
use crate::exit::{ipc_error, CliResult, SUCCESS};

pub async fn run(args: NotifyArgs) -> CliResult<i32> {
    let params = parse_params(args.params.as_deref())?;

    let mut config = ManagerConfig::new("ipcrpc-cli");
    config.transport.security_token = args.token;
    let client = IpcManager::new(config);
    client
        .connect_to_server(&args.address)
        .await
        .map_err(|err| ipc_error("connect failed", err))?;

    let outcome = client.send_notification(&args.method, params).await;
    let _ = client.shutdown().await;
    outcome.map_err(|err| ipc_error("notify failed", err))?;

    debug!(method = %args.method, "notification sent");
    Ok(SUCCESS)
}
