//! # lumen
//!
//! Declarative JSON endpoints on hyper. An endpoint is declared once, with a
//! fluent builder, and every request to it then runs the same pipeline:
//!
//! ```text
//! rate limit (per route, per client)  →  auth (unless public)  →  handler
//! ```
//!
//! Handlers answer through [`Ctx`] helpers, and every answer is shaped into
//! one envelope:
//!
//! ```json
//! { "code": 200, "data": "Hello!", "requestTime": "3ms" }
//! ```
//!
//! `data`, `message` and `pagination` only appear when there is something to
//! put in them. `code` and `requestTime` are always present.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lumen::{ApiError, Ctx, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lumen::Error> {
//!     let server = Server::new(ServerConfig::default())?;
//!
//!     server.endpoint("status")
//!         .get()
//!         .public()
//!         .responds_at("/status")
//!         .max_requests_per_second(2)
//!         .controller(status)?;
//!
//!     server.serve().await
//! }
//!
//! async fn status(ctx: Ctx) -> Result<(), ApiError> {
//!     ctx.logger().debug("Checking status");
//!     ctx.resolve("Hello!");
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! A handler that returns `Err` gets a response chosen by the error's kind:
//! [`ApiError::Validation`] is `400`, [`ApiError::Forbidden`] is `403`,
//! [`ApiError::Conflict`] is `409`. Anything else is logged and answered with
//! an empty `500`, so internals never reach the client.

mod config;
mod context;
mod endpoint;
mod envelope;
mod error;
mod handler;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod logging;
pub mod middleware;

pub use config::{parse_byte_size, ServerConfig};
pub use context::Ctx;
pub use endpoint::EndpointBuilder;
pub use envelope::{aggregation_body, Envelope, Public, PublicFields};
pub use error::{ApiError, ConfigError, Error};
pub use handler::{BoxFuture, Handler, HandlerResult};
pub use logging::{ContextLogger, Logger};
pub use method::Method;
pub use middleware::auth::{AuthGate, BearerToken, DenyAll, Rejection};
pub use middleware::rate_limit::{Admission, Clock, ManualClock, RateLimitPolicy, RateLimiter, SystemClock};
pub use pipeline::{Pipeline, Stage};
pub use request::Request;
pub use response::Response;
pub use server::Server;
pub use status::Status;
