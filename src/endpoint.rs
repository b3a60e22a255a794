//! Fluent endpoint declaration.
//!
//! ```rust,no_run
//! use lumen::{ApiError, Ctx, Server, ServerConfig};
//!
//! # fn main() -> Result<(), lumen::Error> {
//! let server = Server::new(ServerConfig::default())?;
//!
//! server.endpoint("status")
//!     .get()
//!     .public()
//!     .responds_at("/status")
//!     .max_requests_per_second(2)
//!     .controller(|ctx: Ctx| async move {
//!         ctx.resolve("Hello!");
//!         Ok::<_, ApiError>(())
//!     })?;
//! # Ok(())
//! # }
//! ```
//!
//! Every step consumes the builder and hands back a new one, so a partially
//! configured builder can be cloned and finished two different ways.
//! Materializing the same configuration twice registers the route twice; the
//! first registration keeps serving and the second is shadowed.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ConfigError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::rate_limit::RateLimitPolicy;
use crate::pipeline::{Pipeline, PipelineDeps};
use crate::router::{Registration, Router};

/// A validated, frozen endpoint definition.
pub(crate) struct EndpointConfig {
    pub(crate) name: String,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) public: bool,
    pub(crate) rate_limit: RateLimitPolicy,
    pub(crate) handler: BoxedHandler,
}

/// Accumulates an endpoint's configuration. Obtain via
/// [`Server::endpoint`](crate::Server::endpoint).
#[derive(Clone)]
pub struct EndpointBuilder {
    name: String,
    method: Option<Method>,
    path: Option<String>,
    public: bool,
    rate_limit: RateLimitPolicy,
    handler: Option<BoxedHandler>,
    router: Arc<RwLock<Router>>,
    deps: PipelineDeps,
}

impl EndpointBuilder {
    pub(crate) fn new(
        name: &str,
        rate_limit: RateLimitPolicy,
        router: Arc<RwLock<Router>>,
        deps: PipelineDeps,
    ) -> Self {
        Self {
            name: format!("EP:{name}"),
            method: None,
            path: None,
            public: false,
            rate_limit,
            handler: None,
            router,
            deps,
        }
    }

    /// Sets the HTTP method. Returns `self` for chaining; the shortcuts
    /// below do the same for one fixed verb.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Responds to `GET`.
    pub fn get(self) -> Self { self.method(Method::Get) }
    /// Responds to `POST`.
    pub fn post(self) -> Self { self.method(Method::Post) }
    /// Responds to `PUT`.
    pub fn put(self) -> Self { self.method(Method::Put) }
    /// Responds to `DELETE`.
    pub fn delete(self) -> Self { self.method(Method::Delete) }

    /// Skips the auth gate for this endpoint.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Route pattern, `{name}` for parameters: `/users/{id}`.
    pub fn responds_at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `n` requests per second per client, replacing the server-wide policy.
    pub fn max_requests_per_second(self, n: u32) -> Self {
        self.rate_limit(RateLimitPolicy::per_second(n))
    }

    /// Replaces the server-wide policy with `policy`.
    ///
    /// ```rust,no_run
    /// # use lumen::{RateLimitPolicy, Server, ServerConfig};
    /// # let server = Server::new(ServerConfig::default()).unwrap();
    /// // 100 requests per minute per client.
    /// server.endpoint("search")
    ///     .rate_limit(RateLimitPolicy { enabled: true, points: 100, duration: 60 });
    /// ```
    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = policy;
        self
    }

    /// Drops the rate-limit stage from this endpoint's pipeline.
    pub fn without_rate_limit(self) -> Self {
        self.rate_limit(RateLimitPolicy::disabled())
    }

    /// Sets the handler: any `async fn(Ctx) -> Result<(), ApiError>` or an
    /// equivalent closure. A later call replaces an earlier one.
    pub fn handler(mut self, handler: impl Handler) -> Self {
        self.handler = Some(handler.into_boxed_handler());
        self
    }

    /// `handler(h).materialize()`.
    pub fn controller(self, handler: impl Handler) -> Result<Arc<Pipeline>, ConfigError> {
        self.handler(handler).materialize()
    }

    /// Validates the configuration, composes the pipeline and registers it.
    pub fn materialize(self) -> Result<Arc<Pipeline>, ConfigError> {
        let logger = self.deps.logger.tagged(self.name.as_str());
        let config = self.freeze()?;
        let (method, path) = (config.method, config.path.clone());
        let pipeline = Arc::new(Pipeline::compose(config, &self.deps));

        let registration = self.router
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(method, &path, Arc::clone(&pipeline))?;

        match registration {
            Registration::Serving => {
                logger.debug_with("Registered", serde_json::json!({ "method": method.as_str(), "path": path }));
            }
            Registration::Shadowed => {
                logger.warn_with(
                    "Route already registered; this registration will not serve requests",
                    serde_json::json!({ "method": method.as_str(), "path": path }),
                );
            }
        }
        Ok(pipeline)
    }

    fn freeze(&self) -> Result<EndpointConfig, ConfigError> {
        let endpoint = || self.name.clone();
        let method = self.method.ok_or_else(|| ConfigError::MissingMethod { endpoint: endpoint() })?;
        let path = self.path.clone().ok_or_else(|| ConfigError::MissingPath { endpoint: endpoint() })?;
        let handler = self.handler.clone().ok_or_else(|| ConfigError::MissingHandler { endpoint: endpoint() })?;
        if !self.rate_limit.is_valid() {
            return Err(ConfigError::InvalidRateLimit { endpoint: endpoint() });
        }
        Ok(EndpointConfig {
            name: self.name.clone(),
            method,
            path,
            public: self.public,
            rate_limit: self.rate_limit,
            handler,
        })
    }
}

impl fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("public", &self.public)
            .field("rate_limit", &self.rate_limit)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
