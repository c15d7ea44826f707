#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};

use serde_json::Value;

fn unique_temp_dir(tag: &str) -> PathBuf {
    PathBuf::from(format!(
        "/tmp/ipcrpc-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn ipcrpc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ipcrpc"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .env_remove("IPCRPC_AUTH_SECRET")
        .env_remove("IPCRPC_TOKEN")
        .output()
        .expect("ipcrpc should run")
}

fn json_stdout(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

struct Server {
    child: Child,
    address: String,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn serve(tag: &str, extra: &[&str]) -> Server {
    let dir = unique_temp_dir(tag);
    let mut child = Command::new(env!("CARGO_BIN_EXE_ipcrpc"))
        .args(["--log-level", "error", "--format", "json", "serve", tag, "--dir"])
        .arg(&dir)
        .args(extra)
        .env_remove("IPCRPC_AUTH_SECRET")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("serve should print its info");
    let info: Value = serde_json::from_str(line.trim()).expect("info should be JSON");
    let address = info["address"]
        .as_str()
        .expect("info should carry the address")
        .to_string();
    Server { child, address }
}

#[test]
fn version_prints_crate_version() {
    let output = ipcrpc(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("ipcrpc "));
}

#[test]
fn minted_token_verifies_and_tampered_token_is_denied() {
    let output = ipcrpc(&[
        "token",
        "mint",
        "--secret",
        "s3cret",
        "--client-id",
        "renderer",
        "--permission",
        "files.read",
    ]);
    assert!(output.status.success());
    let minted = json_stdout(&output);
    let token = minted["token"].as_str().expect("token should be printed");

    let output = ipcrpc(&["token", "verify", token, "--secret", "s3cret"]);
    assert!(output.status.success());
    let claims = json_stdout(&output);
    assert_eq!(claims["client_id"], "renderer");
    assert_eq!(claims["permissions"][0], "files.read");

    let output = ipcrpc(&["token", "verify", token, "--secret", "other"]);
    assert_eq!(output.status.code(), Some(50));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("token rejected"));
}

#[test]
fn call_against_served_demo_service() {
    let server = serve("call", &[]);

    let output = ipcrpc(&["call", &server.address, "demo.add", "--params", "[5,3]"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply = json_stdout(&output);
    assert_eq!(reply["method"], "demo.add");
    assert_eq!(reply["result"], 8);

    let output = ipcrpc(&[
        "call",
        &server.address,
        "demo.echo",
        "--params",
        r#"{"value": "hi"}"#,
    ]);
    assert!(output.status.success());
    assert_eq!(json_stdout(&output)["result"], "hi");

    let output = ipcrpc(&["call", &server.address, "ipc.ping"]);
    assert!(output.status.success());
    assert_eq!(json_stdout(&output)["result"], "pong");

    let output = ipcrpc(&["notify", &server.address, "demo.echo", "--params", "[1]"]);
    assert!(output.status.success());
}

#[test]
fn call_failures_use_distinct_exit_codes() {
    let server = serve("fail", &[]);

    let output = ipcrpc(&["call", &server.address, "demo.missing"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("demo.missing"));

    let output = ipcrpc(&[
        "call",
        &server.address,
        "demo.sleep",
        "--params",
        "[2000]",
        "--timeout",
        "200ms",
    ]);
    assert_eq!(output.status.code(), Some(124));

    let output = ipcrpc(&["call", &server.address, "demo.add", "--params", "5"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn secret_requires_a_valid_token() {
    let server = serve("auth", &["--secret", "s3cret"]);

    let output = ipcrpc(&["call", &server.address, "demo.add", "--params", "[1,2]"]);
    assert_eq!(output.status.code(), Some(50));

    let output = ipcrpc(&[
        "call",
        &server.address,
        "demo.add",
        "--params",
        "[1,2]",
        "--token",
        "not-a-token",
    ]);
    assert_eq!(output.status.code(), Some(50));

    let minted = json_stdout(&ipcrpc(&[
        "token",
        "mint",
        "--secret",
        "s3cret",
        "--client-id",
        "cli",
    ]));
    let token = minted["token"].as_str().expect("token should be printed");

    let output = ipcrpc(&[
        "call",
        &server.address,
        "demo.add",
        "--params",
        "[1,2]",
        "--token",
        token,
    ]);
    assert!(output.status.success());
    assert_eq!(json_stdout(&output)["result"], 3);
}
