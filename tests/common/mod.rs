//! Shared helpers: an in-memory log capture and one-shot request plumbing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use lumen::{Logger, Response, Server, ServerConfig};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub const PEER: &str = "10.0.0.1:40000";

// =============================================================================
// Log capture
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct Captured {
    pub level: String,
    pub target: String,
    pub tag: String,
    pub message: String,
    pub payload: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Logs(Arc<Mutex<Vec<Captured>>>);

impl Logs {
    pub fn all(&self) -> Vec<Captured> {
        self.0.lock().unwrap().clone()
    }

    pub fn at(&self, level: &str) -> Vec<Captured> {
        self.all().into_iter().filter(|c| c.level == level).collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<Captured> {
        self.all().into_iter().filter(|c| c.message == message).collect()
    }
}

struct Capture(Logs);

impl Visit for Captured {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "tag" => self.tag = format!("{value:?}"),
            "payload" => self.payload = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = Captured {
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_owned(),
            ..Captured::default()
        };
        event.record(&mut captured);
        self.0.0.lock().unwrap().push(captured);
    }
}

pub fn capturing_logger() -> (Logger, Logs) {
    let logs = Logs::default();
    let dispatch = Dispatch::new(tracing_subscriber::registry().with(Capture(logs.clone())));
    (Logger::with_dispatch(dispatch), logs)
}

// =============================================================================
// Servers and requests
// =============================================================================

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        logs_root_directory: std::env::temp_dir(),
        ..ServerConfig::default()
    }
}

pub fn test_server(config: ServerConfig) -> (Server, Logs) {
    let (logger, logs) = capturing_logger();
    (Server::with_logger(config, logger).unwrap(), logs)
}

pub fn request(method: &str, uri: &str) -> http::Request<Bytes> {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &str) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Bytes::copy_from_slice(body.as_bytes()))
        .unwrap()
}

pub fn peer(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

pub async fn send(server: &Server, req: http::Request<Bytes>) -> (u16, Value, Response) {
    send_from(server, req, PEER).await
}

pub async fn send_from(server: &Server, req: http::Request<Bytes>, from: &str) -> (u16, Value, Response) {
    let response = server.handle(req, peer(from)).await;
    let body = if response.body().is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(response.body()).unwrap()
    };
    (u16::from(response.status()), body, response)
}

pub async fn get(server: &Server, uri: &str) -> (u16, Value) {
    let (status, body, _) = send(server, request("GET", uri)).await;
    (status, body)
}

/// Object keys, sorted.
pub fn keys(value: &Value) -> Vec<String> {
    let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    keys
}
