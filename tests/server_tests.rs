//! Request handling outside any endpoint, and serving over a real socket.

mod common;

use std::net::SocketAddr;

use bytes::Bytes;
use lumen::{ApiError, ConfigError, Ctx, Error, Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::*;

fn with_echo(server: &Server) {
    server.endpoint("echo").post().public().responds_at("/echo")
        .controller(|ctx: Ctx| async move {
            let body = ctx.body().clone();
            ctx.resolve(body);
            Ok::<_, ApiError>(())
        })
        .unwrap();
}

// =============================================================================
// Fallbacks
// =============================================================================

#[tokio::test]
async fn unknown_route_is_a_404_envelope() {
    let (server, _) = test_server(test_config());
    let (status, body) = get(&server, "/nowhere").await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], 404);
    assert!(body["requestTime"].is_string());

    let (status, _, _) = send(&server, request("PATCH", "/nowhere")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let (server, _) = test_server(test_config());
    with_echo(&server);

    let (status, body, _) = send(&server, json_request("POST", "/echo", "{\"a\":")).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Invalid JSON body");

    let (status, body, _) = send(&server, json_request("POST", "/echo", r#"{"a":1}"#)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["a"], 1);
}

#[tokio::test]
async fn form_body_reaches_the_handler_as_an_object() {
    let (server, _) = test_server(test_config());
    with_echo(&server);

    let form = http::Request::builder()
        .method("POST")
        .uri("/echo")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(b"name=ada&tag=a&tag=b"))
        .unwrap();
    let (status, body, _) = send(&server, form).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], serde_json::json!({ "name": "ada", "tag": ["a", "b"] }));
}

#[tokio::test]
async fn oversized_form_is_a_413() {
    let config = ServerConfig { request_body_max_size: "8b".into(), ..test_config() };
    let (server, _) = test_server(config);
    with_echo(&server);

    let form = http::Request::builder()
        .method("POST")
        .uri("/echo")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(b"name=a_long_enough_value"))
        .unwrap();
    let (status, _, _) = send(&server, form).await;
    assert_eq!(status, 413);
}

#[tokio::test]
async fn oversized_body_is_a_413() {
    let config = ServerConfig { request_body_max_size: "8b".into(), ..test_config() };
    let (server, _) = test_server(config);
    with_echo(&server);

    let (status, body, _) = send(&server, json_request("POST", "/echo", r#"{"long":"enough"}"#)).await;
    assert_eq!(status, 413);
    assert_eq!(body["code"], 413);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn cors_preflight_and_origin_header() {
    let (server, _) = test_server(test_config());
    with_echo(&server);

    let preflight = http::Request::builder()
        .method("OPTIONS")
        .uri("/echo")
        .header("access-control-request-headers", "content-type")
        .body(Bytes::new())
        .unwrap();
    let response = server.handle(preflight, peer(PEER)).await;
    assert_eq!(u16::from(response.status()), 204);
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    assert_eq!(response.header("access-control-allow-headers"), Some("content-type"));

    let (_, _, response) = send(&server, json_request("POST", "/echo", "{}")).await;
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let (server, _) = test_server(ServerConfig { cors: false, ..test_config() });
    with_echo(&server);

    let (status, _, response) = send(&server, request("OPTIONS", "/echo")).await;
    assert_eq!(status, 404);
    assert_eq!(response.header("access-control-allow-origin"), None);
}

// =============================================================================
// Logging and configuration
// =============================================================================

#[tokio::test]
async fn every_request_gets_an_access_line() {
    let (server, logs) = test_server(test_config());
    get(&server, "/nowhere").await;

    let access: Vec<_> = logs.all().into_iter().filter(|c| c.target == "lumen::access").collect();
    assert_eq!(access.len(), 1);
    assert!(access[0].message.contains("\"GET /nowhere HTTP/1.1\" 404"), "{}", access[0].message);
}

#[test]
fn invalid_config_is_refused() {
    let (logger, logs) = capturing_logger();
    let config = ServerConfig { request_body_max_size: "huge".into(), ..test_config() };

    let err = Server::with_logger(config, logger).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::InvalidOption { field: "request_body_max_size", .. })));
    assert_eq!(logs.at("ERROR").len(), 1);
}

#[test]
fn new_refuses_invalid_config_before_installing_sinks() {
    let root = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        request_body_max_size: "huge".into(),
        logs_root_directory: root.path().to_path_buf(),
        ..test_config()
    };

    let err = Server::new(config).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::InvalidOption { field: "request_body_max_size", .. })));
    assert!(!root.path().join("logs").exists());
    assert!(!tracing::dispatcher::has_been_set());
}

#[test]
fn config_loads_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lumen.toml");
    std::fs::write(&path, "port = 8080\ncors = false\n").unwrap();

    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.port, 8080);
    assert!(!config.cors);
}

// =============================================================================
// Serving over TCP
// =============================================================================

#[tokio::test]
async fn serves_http_over_tcp_and_shuts_down() {
    let (addr_tx, addr_rx) = tokio::sync::oneshot::channel::<SocketAddr>();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let (server, _) = test_server(test_config());
    let server = server.on_listening(move |addr| {
        let _ = addr_tx.send(addr);
    });
    server.endpoint("status").get().public().responds_at("/status")
        .controller(|ctx: Ctx| async move {
            ctx.resolve("Hello!");
            Ok::<_, ApiError>(())
        })
        .unwrap();

    let running = tokio::spawn(server.serve_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    let addr = addr_rx.await.unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.contains("content-type: application/json"), "{raw}");
    assert!(raw.contains(r#""data":"Hello!""#), "{raw}");

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();
}
