use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipcrpc_manager::ManagerInfo;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    result: &'a Value,
    elapsed_ms: u128,
}

pub fn print_call_result(method: &str, result: &Value, elapsed_ms: u128, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method,
                result,
                elapsed_ms,
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["METHOD", "ELAPSED", "RESULT"]);
            table.add_row(vec![
                method.to_string(),
                format!("{elapsed_ms}ms"),
                value_preview(result),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| "null".to_string())
            );
        }
    }
}

pub fn print_server_info(info: &ManagerInfo, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json_line(info),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "ADDRESS", "TRANSPORT", "PID", "METHODS"]);
            table.add_row(vec![
                info.name.clone(),
                info.address.clone().unwrap_or_default(),
                info.transport.unwrap_or("-").to_string(),
                info.pid.to_string(),
                info.method_count.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "serving {} on {} ({} methods, auth {})",
                info.name,
                info.address.as_deref().unwrap_or("-"),
                info.method_count,
                if info.auth_required { "required" } else { "optional" }
            );
        }
    }
}

/// Print a flat JSON object as key/value rows.
pub fn print_fields(fields: &Map<String, Value>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json_line(fields),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.clone(), value_preview(value)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, value) in fields {
                println!("{key}={}", value_preview(value));
            }
        }
    }
}

fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
