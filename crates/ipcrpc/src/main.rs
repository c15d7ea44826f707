mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use tokio::task::LocalSet;

use crate::cmd::Command;
use crate::exit::{io_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ipcrpc", version, about = "Secure local JSON-RPC CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = execute(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

/// Managers are `!Send`, so every command runs on one thread inside a
/// `LocalSet`.
fn execute(command: Command, format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    LocalSet::new().block_on(&runtime, cmd::run(command, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcrpc",
            "call",
            "/tmp/ipcrpc/main.sock",
            "demo.add",
            "--params",
            "[5,3]",
            "--timeout",
            "2s",
        ])
        .expect("call args should parse");

        assert!(matches!(cli.command, Command::Call(_)));
    }

    #[test]
    fn parses_token_mint_with_repeated_permissions() {
        let cli = Cli::try_parse_from([
            "ipcrpc",
            "token",
            "mint",
            "--secret",
            "s3cret",
            "--client-id",
            "renderer",
            "--permission",
            "files.read",
            "--permission",
            "files.write",
        ])
        .expect("mint args should parse");

        let Command::Token(token) = cli.command else {
            panic!("expected token command");
        };
        let cmd::TokenCommand::Mint(mint) = token.command else {
            panic!("expected mint");
        };
        assert_eq!(mint.permission, vec!["files.read", "files.write"]);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["ipcrpc", "version", "--format", "json", "--log-level", "debug"])
            .expect("global flags should parse after subcommand");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }

    #[test]
    fn call_requires_a_method() {
        let err = Cli::try_parse_from(["ipcrpc", "call", "/tmp/ipcrpc/main.sock"])
            .expect_err("missing method should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
