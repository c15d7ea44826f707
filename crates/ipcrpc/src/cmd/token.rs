use std::time::Duration;

use ipcrpc_security::{IpcSecurity, SecurityConfig};
use serde_json::{Map, Value};

use crate::cmd::{MintArgs, TokenArgs, TokenCommand, VerifyArgs};
use crate::exit::{security_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: TokenArgs, format: OutputFormat) -> CliResult<i32> {
    match args.command {
        TokenCommand::Mint(args) => mint(args, format),
        TokenCommand::Verify(args) => verify(args, format),
    }
}

fn mint(args: MintArgs, format: OutputFormat) -> CliResult<i32> {
    let security = IpcSecurity::new(SecurityConfig::secure(args.secret));
    let token = security
        .generate_auth_token(&args.client_id, &args.permission)
        .map_err(|err| security_error("mint failed", err))?;

    let mut fields = Map::new();
    fields.insert("client_id".to_string(), Value::from(args.client_id));
    fields.insert("token".to_string(), Value::from(token));
    print_fields(&fields, format);
    Ok(SUCCESS)
}

fn verify(args: VerifyArgs, format: OutputFormat) -> CliResult<i32> {
    let security = IpcSecurity::new(SecurityConfig::secure(args.secret));
    let claims = security
        .verify_token_with_age(&args.token, Duration::from_secs(args.max_age))
        .map_err(|err| security_error("token rejected", err))?;
    print_fields(&claims, format);
    Ok(SUCCESS)
}
