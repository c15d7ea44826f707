#![cfg(unix)]

use std::cell::RefCell;
use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use ipcrpc_manager::{IpcError, IpcManager, ManagerConfig, ManagerState, SERVER_PEER};
use ipcrpc_protocol::{CallError, ErrorCode};
use ipcrpc_router::{MethodSpec, Service};
use ipcrpc_security::SecurityConfig;
use ipcrpc_transport::Transport;
use serde_json::{json, Value};
use tokio::task::LocalSet;

fn temp_dir(tag: &str) -> PathBuf {
    PathBuf::from(format!(
        "/tmp/ipcrpc-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn server_config(tag: &str) -> ManagerConfig {
    let mut config = ManagerConfig::new(tag);
    config.transport.directory = Some(temp_dir(tag));
    config
}

fn demo_service() -> Service {
    Service::new("demo")
        .method(MethodSpec::sync("echo", |args| {
            Ok(args.get(0).cloned().unwrap_or(Value::Null))
        }))
        .method(
            MethodSpec::sync("add", |args| {
                let a: i64 = args.value(0)?;
                let b: i64 = args.value(1)?;
                Ok(json!(a + b))
            })
            .params(["a", "b"]),
        )
        .method(MethodSpec::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("late"))
        }))
}

fn run_local<F: Future<Output = ()>>(test: F) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");
    LocalSet::new().block_on(&runtime, test);
}

async fn start(config: ManagerConfig) -> (IpcManager, String) {
    let server = IpcManager::new(config);
    server
        .register_service(demo_service())
        .expect("demo service should register");
    let address = server.start_server().expect("server should start");
    (server, address)
}

async fn connect(address: &str, token: Option<String>) -> IpcManager {
    let mut config = ManagerConfig::new("client");
    config.transport.security_token = token;
    let client = IpcManager::new(config);
    client
        .connect_to_server(address)
        .await
        .expect("client should connect");
    client
}

fn remote_code(err: &IpcError) -> Option<ErrorCode> {
    err.rpc_error().map(|e| e.code)
}

#[test]
fn echo_round_trip() {
    run_local(async {
        let (server, address) = start(server_config("echo")).await;
        assert_eq!(server.state(), ManagerState::Active(ipcrpc_manager::Role::Server));

        let client = connect(&address, None).await;
        let reply = client
            .call_method("echo", Some(json!(["hi"])), Some(Duration::from_secs(5)))
            .await
            .expect("echo should succeed");
        assert_eq!(reply, json!("hi"));

        client.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
    });
}

#[test]
fn add_binds_positional_and_named_params() {
    run_local(async {
        let (server, address) = start(server_config("add")).await;
        let client = connect(&address, None).await;

        let positional = client.call_method("add", Some(json!([5, 3])), None).await.unwrap();
        let named = client
            .call_method("add", Some(json!({"a": 5, "b": 3})), None)
            .await
            .unwrap();
        assert_eq!(positional, json!(8));
        assert_eq!(named, json!(8));

        let err = client
            .call_method("add", Some(json!(["five", 3])), None)
            .await
            .unwrap_err();
        assert_eq!(remote_code(&err), Some(ErrorCode::InvalidParams));

        server.shutdown().await.unwrap();
    });
}

#[test]
fn unknown_method_is_reported_with_its_name() {
    run_local(async {
        let (server, address) = start(server_config("unknown")).await;
        let client = connect(&address, None).await;

        let err = client.call_method("x.y", None, None).await.unwrap_err();
        let rpc = err.rpc_error().expect("remote error expected");
        assert_eq!(rpc.code, ErrorCode::MethodNotFound);
        assert!(rpc.message.contains("x.y"));

        server.shutdown().await.unwrap();
    });
}

#[test]
fn notifications_are_handled_in_order_without_reply() {
    run_local(async {
        let (server, address) = start(server_config("notify")).await;
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        server
            .register_method(
                MethodSpec::sync("log", move |args| {
                    sink.borrow_mut().push(args.get(0).cloned().unwrap_or(Value::Null));
                    Ok(Value::Null)
                }),
                "demo",
            )
            .unwrap();

        let client = connect(&address, None).await;
        client.send_notification("log", Some(json!(["one"]))).await.unwrap();
        client.send_notification("log", Some(json!(["two"]))).await.unwrap();
        client.send_notification("missing.method", None).await.unwrap();

        // Frames on one connection are handled in arrival order, so the
        // notifications are done once the ping is answered.
        let pong = client.call_method("ipc.ping", None, None).await.unwrap();
        assert_eq!(pong, json!("pong"));
        assert_eq!(seen.borrow().as_slice(), &[json!("one"), json!("two")]);
        assert_eq!(client.info().pending_calls, 0);

        server.shutdown().await.unwrap();
    });
}

#[test]
fn timeout_is_distinct_and_frees_the_slot() {
    run_local(async {
        let (server, address) = start(server_config("timeout")).await;
        let client = connect(&address, None).await;

        let err = client
            .call_method("slow", None, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.code(), Some(ErrorCode::Timeout));
        assert!(err.rpc_error().is_none());
        assert_eq!(client.info().pending_calls, 0);

        client.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
    });
}

#[test]
fn server_can_call_the_client() {
    run_local(async {
        let (server, address) = start(server_config("reverse")).await;
        let client = connect(&address, None).await;
        client
            .register_method(MethodSpec::sync("whoami", |_| Ok(json!("renderer"))), "client")
            .unwrap();

        client.call_method("ipc.ping", None, None).await.unwrap();
        let peers = server.list_connections();
        assert_eq!(peers.len(), 1);
        let peer = peers[0].peer_id.clone();
        assert_eq!(peer, "peer-1");

        let reply = server.call_peer(&peer, "whoami", None, None).await.unwrap();
        assert_eq!(reply, json!("renderer"));
        let reply = server.call_method("whoami", None, None).await.unwrap();
        assert_eq!(reply, json!("renderer"));

        assert!(client.connection_info(SERVER_PEER).is_some());
        server.shutdown().await.unwrap();
    });
}

#[test]
fn auth_gate_and_token_login() {
    run_local(async {
        let mut config = server_config("auth");
        config.security = Some(SecurityConfig::secure("s3cret"));
        let (server, address) = start(config).await;
        server
            .register_method(
                MethodSpec::sync("admin.stats", |args| {
                    Ok(json!({ "peer": args.context().peer_id }))
                })
                .requires_auth(true)
                .permissions(["admin"]),
                "admin",
            )
            .unwrap();

        let anonymous = connect(&address, None).await;
        let err = anonymous.call_method("echo", Some(json!([1])), None).await.unwrap_err();
        let rpc = err.rpc_error().expect("remote error expected");
        assert_eq!(rpc.code, ErrorCode::PermissionDenied);
        assert_eq!(rpc.message, "Authentication required");
        assert_eq!(
            anonymous.call_method("ipc.ping", None, None).await.unwrap(),
            json!("pong")
        );

        let reader = server.generate_auth_token("reader", &[]).unwrap();
        let client = connect(&address, Some(reader)).await;
        assert_eq!(
            client.call_method("echo", Some(json!([1])), None).await.unwrap(),
            json!(1)
        );
        let err = client.call_method("admin.stats", None, None).await.unwrap_err();
        assert!(err.rpc_error().unwrap().message.contains("admin"));

        let admin = server
            .generate_auth_token("ops", &["admin".to_string()])
            .unwrap();
        let client = connect(&address, Some(admin)).await;
        assert!(client.call_method("admin.stats", None, None).await.is_ok());

        let authenticated = server
            .list_connections()
            .into_iter()
            .filter(|conn| conn.authenticated)
            .count();
        assert_eq!(authenticated, 2);

        server.shutdown().await.unwrap();
    });
}

#[test]
fn bad_token_fails_connect() {
    run_local(async {
        let mut config = server_config("badtoken");
        config.security = Some(SecurityConfig::secure("s3cret"));
        let (server, address) = start(config).await;

        let mut client_config = ManagerConfig::new("client");
        client_config.transport.security_token = Some("not-a-token".to_string());
        let client = IpcManager::new(client_config);
        let err = client.connect_to_server(&address).await.unwrap_err();
        assert!(matches!(err, IpcError::AuthenticationFailed(_)));
        assert_eq!(client.state(), ManagerState::Idle);

        server.shutdown().await.unwrap();
    });
}

#[test]
fn security_violations_get_error_replies() {
    run_local(async {
        let (server, address) = start(server_config("policy")).await;
        let client = connect(&address, None).await;

        let err = client.call_method("system.exec", None, None).await.unwrap_err();
        assert_eq!(remote_code(&err), Some(ErrorCode::PermissionDenied));

        let err = client
            .call_method("echo", Some(json!({"__class__": 1})), None)
            .await
            .unwrap_err();
        assert_eq!(remote_code(&err), Some(ErrorCode::PermissionDenied));

        // The connection survives a refused request.
        assert_eq!(
            client.call_method("echo", Some(json!(["ok"])), None).await.unwrap(),
            json!("ok")
        );
        server.shutdown().await.unwrap();
    });
}

#[test]
fn rate_limit_refuses_excess_requests() {
    run_local(async {
        let mut config = server_config("ratelimit");
        config.security = Some(SecurityConfig {
            max_requests_per_minute: 3,
            ..SecurityConfig::default()
        });
        let (server, address) = start(config).await;
        let client = connect(&address, None).await;

        for _ in 0..3 {
            client.call_method("ipc.ping", None, None).await.unwrap();
        }
        let err = client.call_method("ipc.ping", None, None).await.unwrap_err();
        let rpc = err.rpc_error().expect("remote error expected");
        assert_eq!(rpc.code, ErrorCode::PermissionDenied);
        assert!(rpc.message.contains("rate limit"));

        server.shutdown().await.unwrap();
    });
}

#[test]
fn connection_limit_refuses_extra_peers() {
    run_local(async {
        let mut config = server_config("limit");
        config.transport.max_connections = 1;
        let (server, address) = start(config).await;

        let first = connect(&address, None).await;
        first.call_method("ipc.ping", None, None).await.unwrap();

        let second = connect(&address, None).await;
        let result = second
            .call_method("ipc.ping", None, Some(Duration::from_secs(2)))
            .await;
        assert!(result.is_err());
        assert_eq!(server.list_connections().len(), 1);

        server.shutdown().await.unwrap();
    });
}

#[test]
fn describe_lists_services() {
    run_local(async {
        let (server, address) = start(server_config("describe")).await;
        let client = connect(&address, None).await;

        let described = client.call_method("ipc.describe", None, None).await.unwrap();
        assert_eq!(described["services"]["demo"]["method_count"], json!(3));
        assert!(described["services"]["ipc"]["methods"]
            .get("ipc.authenticate")
            .is_some());

        server.shutdown().await.unwrap();
    });
}

#[test]
fn disconnect_fails_pending_calls() {
    run_local(async {
        let (server, address) = start(server_config("disconnect")).await;
        server
            .register_method(
                MethodSpec::new("hang", |_| async {
                    std::future::pending::<()>().await;
                    Ok(Value::Null)
                }),
                "demo",
            )
            .unwrap();
        let client = Rc::new(connect(&address, None).await);

        let caller = client.clone();
        let call = tokio::task::spawn_local(async move {
            caller
                .call_method("hang", None, Some(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.info().pending_calls, 1);

        assert!(client.disconnect_client(SERVER_PEER));
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, IpcError::Call(CallError::Disconnected(_))));
        assert!(err.is_disconnect());

        let err = client.call_method("ipc.ping", None, None).await.unwrap_err();
        assert!(matches!(err, IpcError::NotConnected));

        server.shutdown().await.unwrap();
    });
}

#[test]
fn shutdown_order_and_cleanup() {
    run_local(async {
        let (server, address) = start(server_config("shutdown")).await;

        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let client = IpcManager::new(ManagerConfig::new("client"));
        client
            .register_method(
                MethodSpec::sync("bye", move |args| {
                    sink.borrow_mut().push(args.get(0).cloned().unwrap_or(Value::Null));
                    Ok(Value::Null)
                }),
                "events",
            )
            .expect("bye should register");
        client
            .connect_to_server(&address)
            .await
            .expect("client should connect");
        client.call_method("ipc.ping", None, None).await.unwrap();

        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        let socket = PathBuf::from(&address);
        let socket_seen = socket.clone();
        let notifier = server.clone();
        server.on_shutdown(move || async move {
            // Handlers run before the transport closes and can still send.
            log.borrow_mut().push(socket_seen.exists());
            let sent = notifier
                .send_notification("bye", Some(json!(["final"])))
                .await;
            log.borrow_mut().push(sent.is_ok());
        });

        assert!(socket.exists());
        server.shutdown().await.unwrap();
        assert_eq!(events.borrow().as_slice(), &[true, true]);
        assert!(!socket.exists());
        assert_eq!(server.state(), ManagerState::Closed);
        assert!(server.list_connections().is_empty());

        for _ in 0..100 {
            if !received.borrow().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.borrow().as_slice(), &[json!("final")]);

        let err = server.start_server().unwrap_err();
        assert!(matches!(err, IpcError::InvalidState { .. }));
        let err = server.send_notification("late", None).await.unwrap_err();
        assert!(matches!(err, IpcError::NotConnected));

        client.shutdown().await.unwrap();
        if let Some(dir) = socket.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    });
}

#[test]
fn failed_request_write_drops_the_connection() {
    run_local(async {
        let (server, address) = start(server_config("brokenpipe")).await;
        let transport = Transport::for_platform().expect("platform transport");
        let raw = transport
            .connect(&address, Duration::from_secs(1))
            .await
            .expect("raw peer should connect");

        for _ in 0..100 {
            if !server.list_connections().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let peer_id = server.list_connections()[0].peer_id.clone();

        // No await between the close and the call, so the receive loop has not
        // seen EOF yet and the write itself fails.
        drop(raw);
        let err = server
            .call_peer(&peer_id, "echo", Some(json!([1])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::Frame(_)), "unexpected error: {err}");
        assert!(server.connection_info(&peer_id).is_none());
        assert_eq!(server.info().pending_calls, 0);

        server.shutdown().await.unwrap();
    });
}

#[test]
fn second_start_is_rejected() {
    run_local(async {
        let (server, _address) = start(server_config("twice")).await;
        let err = server.start_server().unwrap_err();
        assert!(matches!(
            err,
            IpcError::InvalidState {
                operation: "start server",
                ..
            }
        ));
        server.shutdown().await.unwrap();
    });
}

#[test]
fn inactive_connections_are_swept() {
    run_local(async {
        let mut config = server_config("sweep");
        config.inactivity_timeout = Duration::from_millis(50);
        let (server, address) = start(config).await;
        let client = connect(&address, None).await;
        client.call_method("ipc.ping", None, None).await.unwrap();
        assert_eq!(server.list_connections().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.cleanup(), 1);
        assert!(server.list_connections().is_empty());

        for _ in 0..100 {
            if client.connection_info(SERVER_PEER).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.connection_info(SERVER_PEER).is_none());

        server.shutdown().await.unwrap();
    });
}
