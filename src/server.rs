//! HTTP server, request dispatch and graceful shutdown.
//!
//! Every request takes the same path through [`Server::handle`]:
//!
//! 1. CORS preflight (`OPTIONS`) is answered directly when CORS is on.
//! 2. Bodies over `request_body_max_size` get `413`.
//! 3. `application/json` and URL-encoded form bodies are decoded; malformed
//!    JSON gets `400`.
//! 4. The router picks the endpoint's [`Pipeline`]; no match gets `404`.
//! 5. The pipeline runs and its response is returned.
//!
//! Each request then gets one access-log line in combined format.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections, lets every
//! in-flight connection finish, and returns from [`Server::serve`].

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use url::form_urlencoded;

use crate::config::ServerConfig;
use crate::endpoint::EndpointBuilder;
use crate::envelope::Envelope;
use crate::error::Error;
use crate::logging::{self, ContextLogger, LogOptions, Logger};
use crate::method::Method;
use crate::middleware::auth::{AuthGate, DenyAll};
use crate::middleware::rate_limit::{Clock, SystemClock};
use crate::pipeline::PipelineDeps;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

const SERVER_TAG: &str = "lumen";

/// Why a body was not read.
enum BodyError {
    TooLarge,
    Read(String),
}

type OnListening = Box<dyn FnOnce(SocketAddr) + Send + Sync>;

/// The HTTP server. Owns the route table that endpoints register into.
///
/// Configure the auth gate and clock before declaring endpoints: each
/// endpoint captures them when [`endpoint`](Server::endpoint) is called.
pub struct Server {
    config: ServerConfig,
    logger: Logger,
    log: ContextLogger,
    auth: Arc<dyn AuthGate>,
    clock: Arc<dyn Clock>,
    router: Arc<RwLock<Router>>,
    body_limit: usize,
    on_listening: Option<OnListening>,
}

impl Server {
    /// Validates `config` and installs the log sinks it names.
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        if let Err(e) = config.validate() {
            // No sinks exist yet.
            logging::console(config.debug)
                .tagged(SERVER_TAG)
                .error_with("Invalid server configuration", json!({ "error": e.to_string() }));
            return Err(e.into());
        }
        let logger = logging::install(&LogOptions {
            root: config.logs_root_directory.clone(),
            debug: config.debug,
            console_only: false,
        })?;
        Self::with_logger(config, logger)
    }

    /// Like [`new`](Server::new) but logs to `logger` and installs nothing.
    pub fn with_logger(config: ServerConfig, logger: Logger) -> Result<Self, Error> {
        let log = logger.tagged(SERVER_TAG);
        let body_limit = match config.body_limit().and_then(|limit| config.validate().map(|()| limit)) {
            Ok(limit) => limit,
            Err(e) => {
                log.error_with("Invalid server configuration", json!({ "error": e.to_string() }));
                return Err(e.into());
            }
        };
        Ok(Self {
            config,
            log,
            logger,
            auth: Arc::new(DenyAll),
            clock: Arc::new(SystemClock),
            router: Arc::new(RwLock::new(Router::new())),
            body_limit,
            on_listening: None,
        })
    }

    /// Replaces the gate private endpoints are checked against.
    /// The default, [`DenyAll`], rejects every request.
    pub fn with_auth(mut self, gate: impl AuthGate) -> Self {
        self.auth = Arc::new(gate);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Called once with the bound address when the listener is ready.
    pub fn on_listening(mut self, f: impl FnOnce(SocketAddr) + Send + Sync + 'static) -> Self {
        self.on_listening = Some(Box::new(f));
        self
    }

    /// Starts declaring an endpoint. Its log tag is `EP:<name>`.
    pub fn endpoint(&self, name: &str) -> EndpointBuilder {
        EndpointBuilder::new(
            name,
            self.config.global_rate_limiter,
            Arc::clone(&self.router),
            PipelineDeps {
                logger: self.logger.clone(),
                auth: Arc::clone(&self.auth),
                clock: Arc::clone(&self.clock),
                handler_timeout: self.config.handler_timeout(),
            },
        )
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of registered endpoints, shadowed duplicates included.
    pub fn routes(&self) -> usize {
        self.router.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs one fully buffered request through the server without a socket.
    pub async fn handle(&self, req: http::Request<Bytes>, remote_addr: SocketAddr) -> Response {
        let started_at = Instant::now();
        let (parts, body) = req.into_parts();
        let body = if body.len() > self.body_limit { Err(BodyError::TooLarge) } else { Ok(body) };
        self.respond(parts, body, remote_addr, started_at).await
    }

    /// Binds `host:port` and serves until SIGTERM or Ctrl-C.
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Binds `host:port` and serves until `shutdown` resolves, then drains
    /// in-flight connections.
    pub async fn serve_with_shutdown(mut self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        self.log.info_with("Api server ready", json!({ "port": local_addr.port() }));
        if let Some(f) = self.on_listening.take() {
            f(local_addr);
        }

        let server = Arc::new(self);
        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepting even if more
                // connections are queued.
                biased;

                () = &mut shutdown => {
                    server.log.info_with("Shutting down", json!({ "inFlight": tasks.len() }));
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            server.log.error_with("Accept failed", json!({ "error": e.to_string() }));
                            continue;
                        }
                    };

                    let server = Arc::clone(&server);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let conn_server = Arc::clone(&server);
                        let svc = service_fn(move |req| {
                            let server = Arc::clone(&conn_server);
                            async move { dispatch(server, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            server.log.debug_with(
                                "Connection closed with error",
                                json!({ "peer": remote_addr.to_string(), "error": e.to_string() }),
                            );
                        }
                    });
                }

                // Reap finished connections so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        server.log.info("Stopped");
        Ok(())
    }

    async fn respond(
        &self,
        parts: http::request::Parts,
        body: Result<Bytes, BodyError>,
        remote_addr: SocketAddr,
        started_at: Instant,
    ) -> Response {
        let access = AccessLine::new(&parts, remote_addr);
        let response = self.route(parts, body, remote_addr, started_at).await;
        let response = if self.config.cors {
            response.with_header("access-control-allow-origin", "*")
        } else {
            response
        };
        self.logger.access(&access.finish(&response));
        response
    }

    async fn route(
        &self,
        parts: http::request::Parts,
        body: Result<Bytes, BodyError>,
        remote_addr: SocketAddr,
        started_at: Instant,
    ) -> Response {
        if self.config.cors && parts.method == http::Method::OPTIONS {
            return preflight(&parts);
        }

        let body = match body {
            Ok(body) => body,
            Err(BodyError::TooLarge) => {
                return Envelope::bare(Status::ContentTooLarge, Some("Payload Too Large"), started_at)
                    .into_response();
            }
            Err(BodyError::Read(e)) => {
                self.log.debug_with("Request body unreadable", json!({ "error": e }));
                return Envelope::bare(Status::BadRequest, Some("Unreadable request body"), started_at)
                    .into_response();
            }
        };

        let json_body = match parse_body(&parts.headers, &body) {
            Ok(value) => value,
            Err(e) => {
                self.log.debug_with("Malformed JSON body", json!({ "error": e.to_string() }));
                return Envelope::bare(Status::BadRequest, Some("Invalid JSON body"), started_at)
                    .into_response();
            }
        };

        let Ok(method) = Method::try_from(&parts.method) else {
            return Envelope::bare(Status::NotFound, Some("Not Found"), started_at).into_response();
        };

        // Scoped so the read guard is released before the pipeline awaits.
        let found = {
            let router = self.router.read().unwrap_or_else(PoisonError::into_inner);
            router.lookup(method, parts.uri.path())
        };
        let Some((pipeline, params)) = found else {
            return Envelope::bare(Status::NotFound, Some("Not Found"), started_at).into_response();
        };

        let req = Request::new(parts, method, body, params, remote_addr, started_at);
        pipeline.run(req, json_body).await
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.routes())
            .finish_non_exhaustive()
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body within the size limit and hands the request to the server.
/// All failures become responses, so hyper never sees an error.
async fn dispatch(
    server: Arc<Server>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let started_at = Instant::now();
    let (parts, incoming) = req.into_parts();

    let body = match Limited::new(incoming, server.body_limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e.to_string())),
    };

    Ok(server.respond(parts, body, remote_addr, started_at).await.into_inner())
}

/// Decodes JSON and URL-encoded form bodies. `Null` for a blank body or
/// any other content type.
fn parse_body(headers: &http::HeaderMap, body: &[u8]) -> serde_json::Result<Value> {
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase())
        .unwrap_or_default();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    if content_type.starts_with("application/json") {
        serde_json::from_slice(body)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(form_body(body))
    } else {
        Ok(Value::Null)
    }
}

/// Form fields as a JSON object of strings. A repeated key collects its
/// values into an array.
fn form_body(body: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in form_urlencoded::parse(body) {
        let value = Value::String(value.into_owned());
        match fields.get_mut(key.as_ref()) {
            None => {
                fields.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(first) => *first = Value::Array(vec![first.take(), value]),
        }
    }
    Value::Object(fields)
}

fn preflight(parts: &http::request::Parts) -> Response {
    let allow_headers = parts.headers
        .get(http::header::ACCESS_CONTROL_REQUEST_HEADERS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("content-type, authorization")
        .to_owned();
    Response::empty(Status::NoContent)
        .with_header("access-control-allow-methods", "GET,HEAD,PUT,PATCH,POST,DELETE")
        .with_header("access-control-allow-headers", &allow_headers)
}

/// The request half of a combined-format access log line.
struct AccessLine {
    remote: String,
    request: String,
    referer: String,
    user_agent: String,
}

impl AccessLine {
    fn new(parts: &http::request::Parts, remote_addr: SocketAddr) -> Self {
        let header = |name: http::header::HeaderName| {
            parts.headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("-").to_owned()
        };
        let url = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        Self {
            remote: remote_addr.ip().to_string(),
            request: format!("{} {url} {:?}", parts.method, parts.version),
            referer: header(http::header::REFERER),
            user_agent: header(http::header::USER_AGENT),
        }
    }

    fn finish(self, response: &Response) -> String {
        format!(
            "{} - - [{}] \"{}\" {} {} \"{}\" \"{}\"",
            self.remote,
            chrono::Utc::now().format("%d/%b/%Y:%H:%M:%S %z"),
            self.request,
            u16::from(response.status()),
            response.body().len(),
            self.referer,
            self.user_agent,
        )
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT. A signal that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let log = Logger::global().tagged(SERVER_TAG);

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log.error_with("Cannot listen for Ctrl-C", json!({ "error": e.to_string() }));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log.error_with("Cannot listen for SIGTERM", json!({ "error": e.to_string() }));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
