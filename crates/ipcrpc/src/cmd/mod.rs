use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::Value;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod notify;
pub mod serve;
pub mod token;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the demo service until interrupted.
    Serve(ServeArgs),
    /// Call a method on a server and print the result.
    Call(CallArgs),
    /// Send a notification to a server.
    Notify(NotifyArgs),
    /// Mint or verify auth tokens.
    Token(TokenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Call(args) => call::run(args, format).await,
        Command::Notify(args) => notify::run(args).await,
        Command::Token(args) => token::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint name, embedded in the generated address.
    pub name: String,
    /// JSON manager configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Shared auth secret. Enables token enforcement.
    #[arg(long, env = "IPCRPC_AUTH_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
    /// Directory for the endpoint socket.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
    /// Maximum concurrently connected clients.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Server address printed by `serve`.
    pub address: String,
    /// Fully qualified method name (e.g. demo.echo).
    pub method: String,
    /// JSON params: an array (positional) or an object (named).
    #[arg(long)]
    pub params: Option<String>,
    /// Maximum time to wait for the result (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Auth token presented after connecting.
    #[arg(long, env = "IPCRPC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Server address printed by `serve`.
    pub address: String,
    /// Fully qualified method name.
    pub method: String,
    /// JSON params: an array (positional) or an object (named).
    #[arg(long)]
    pub params: Option<String>,
    /// Auth token presented after connecting.
    #[arg(long, env = "IPCRPC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Mint a signed token for a client.
    Mint(MintArgs),
    /// Verify a token and print its claims.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct MintArgs {
    /// Shared auth secret.
    #[arg(long, env = "IPCRPC_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Client identifier recorded in the token.
    #[arg(long)]
    pub client_id: String,
    /// Permission granted to the client (repeatable).
    #[arg(long)]
    pub permission: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Token to verify.
    pub token: String,
    /// Shared auth secret.
    #[arg(long, env = "IPCRPC_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Maximum accepted token age in seconds.
    #[arg(long, default_value_t = 3600)]
    pub max_age: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Include build and platform details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `--params`; only arrays and objects are valid JSON-RPC params.
pub(crate) fn parse_params(input: Option<&str>) -> CliResult<Option<Value>> {
    let Some(input) = input else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("--params is not valid JSON: {err}")))?;
    match value {
        Value::Array(_) | Value::Object(_) => Ok(Some(value)),
        _ => Err(CliError::new(
            USAGE,
            "--params must be a JSON array or object",
        )),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
