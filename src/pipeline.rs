//! The per-endpoint request pipeline.
//!
//! Every endpoint runs the same fixed sequence:
//!
//! ```text
//! [RateLimit]  →  [Auth]  →  Handler  →  envelope / error translation
//!  if enabled     if private
//! ```
//!
//! Rate limiting comes first so abusive traffic is turned away before any
//! authentication work. Authentication sits directly in front of the handler
//! so no private business logic runs unauthenticated.
//!
//! Handler errors are translated here and only here:
//!
//! | [`ApiError`] | Status | Envelope |
//! |---|---|---|
//! | `Validation(detail)` | 400 | `data = detail` |
//! | `Forbidden(msg)` | 403 | `message = msg` |
//! | `Conflict { reason }` | 409 | `data = { reason }` |
//! | `Internal(_)` / panic | 500 | empty; logged as `Controller crash` |

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::context::{Ctx, ResponseSlot};
use crate::endpoint::EndpointConfig;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::handler::{BoxedHandler, HandlerResult};
use crate::logging::{ContextLogger, Logger};
use crate::middleware::auth::AuthGate;
use crate::middleware::rate_limit::{Admission, Clock, RateLimiter};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// The collaborators every pipeline is built from.
#[derive(Clone)]
pub(crate) struct PipelineDeps {
    pub(crate) logger: Logger,
    pub(crate) auth: Arc<dyn AuthGate>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) handler_timeout: Option<Duration>,
}

/// One step of a composed pipeline, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    RateLimit,
    Auth,
    Handler,
}

enum Guard {
    RateLimit(RateLimiter),
    Auth(Arc<dyn AuthGate>),
}

/// A materialized endpoint: guards, handler, and the loggers they report to.
pub struct Pipeline {
    name: Arc<str>,
    guards: Vec<Guard>,
    handler: BoxedHandler,
    logger: ContextLogger,
    limiter_logger: ContextLogger,
    handler_timeout: Option<Duration>,
}

impl Pipeline {
    pub(crate) fn compose(config: EndpointConfig, deps: &PipelineDeps) -> Self {
        let mut guards = Vec::with_capacity(2);
        if config.rate_limit.enabled {
            guards.push(Guard::RateLimit(RateLimiter::new(config.rate_limit, Arc::clone(&deps.clock))));
        }
        if !config.public {
            guards.push(Guard::Auth(Arc::clone(&deps.auth)));
        }

        let name: Arc<str> = config.name.into();
        Self {
            logger: deps.logger.tagged(Arc::clone(&name)),
            limiter_logger: deps.logger.tagged("rateLimiter"),
            name,
            guards,
            handler: config.handler,
            handler_timeout: deps.handler_timeout,
        }
    }

    /// The endpoint's log tag, e.g. `EP:status`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.guards.iter()
            .map(|g| match g {
                Guard::RateLimit(_) => Stage::RateLimit,
                Guard::Auth(_) => Stage::Auth,
            })
            .chain(std::iter::once(Stage::Handler))
            .collect()
    }

    pub(crate) async fn run(&self, req: Request, body: Value) -> Response {
        for guard in &self.guards {
            match guard {
                Guard::RateLimit(limiter) => {
                    let id = req.client_id();
                    if let Admission::Rejected { retry_after } = limiter.admit(&id) {
                        return self.too_many_requests(&req, &id, retry_after);
                    }
                }
                Guard::Auth(gate) => {
                    if let Err(rejection) = gate.authorize(&req).await {
                        return Envelope::bare(rejection.status(), Some(rejection.message()), req.started_at())
                            .into_response();
                    }
                }
            }
        }
        self.invoke(req, body).await
    }

    async fn invoke(&self, req: Request, body: Value) -> Response {
        let started_at = req.started_at();
        let slot = Arc::new(ResponseSlot::default());
        let ctx = Ctx::new(req, body, self.logger.clone(), Arc::clone(&slot));

        self.logger.debug("Started");

        // The handler runs in its own task so a panic surfaces as a JoinError
        // instead of tearing down the connection.
        let task = tokio::spawn(self.handler.call(ctx));
        let abort = task.abort_handle();
        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return self.timed_out(&slot, limit, started_at);
                }
            },
            None => task.await,
        };

        let outcome: HandlerResult = joined.unwrap_or_else(|e| {
            Err(ApiError::Internal(anyhow::anyhow!("handler panicked: {e}")))
        });

        match outcome {
            Ok(()) => match slot.take() {
                Some(response) => {
                    self.logger.debug_with("Done", json!({ "requestTime": slot.request_time() }));
                    response
                }
                None => {
                    self.logger.error("Controller finished without responding");
                    Envelope::bare(Status::InternalServerError, None, started_at).into_response()
                }
            },
            Err(err) => {
                let translated = self.translate(err, &slot, started_at);
                match slot.take() {
                    Some(already_sent) => {
                        self.logger.warn("Handler failed after responding; keeping the first response");
                        already_sent
                    }
                    None => translated,
                }
            }
        }
    }

    fn translate(&self, err: ApiError, slot: &ResponseSlot, started_at: Instant) -> Response {
        let pagination = slot.pagination();
        let envelope = match err {
            ApiError::Validation(detail) => {
                shaped(Status::BadRequest, &detail, None, pagination, started_at)
            }
            ApiError::Forbidden(message) => {
                shaped(Status::Forbidden, &Value::Null, Some(&message), pagination, started_at)
            }
            ApiError::Conflict { reason } => {
                shaped(Status::Conflict, &json!({ "reason": reason }), None, pagination, started_at)
            }
            ApiError::Internal(e) => {
                self.logger.error("Controller crash");
                // Printed directly so the failure is visible even if the log sink is broken.
                eprintln!("{}: {e:?}", self.name);
                shaped(Status::InternalServerError, &Value::Null, None, pagination, started_at)
            }
        };
        envelope.into_response()
    }

    fn too_many_requests(&self, req: &Request, id: &str, retry_after: Duration) -> Response {
        self.limiter_logger.warn_with("Too many requests", json!({ "ip": id, "url": req.url() }));
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Envelope::bare(Status::TooManyRequests, Some("Too Many Requests"), req.started_at())
            .into_response()
            .with_header("retry-after", &secs.max(1).to_string())
    }

    fn timed_out(&self, slot: &ResponseSlot, limit: Duration, started_at: Instant) -> Response {
        self.logger.warn_with("Handler timed out", json!({ "limitMs": limit.as_millis() as u64 }));
        slot.take().unwrap_or_else(|| {
            Envelope::bare(Status::RequestTimeout, Some("Request Timeout"), started_at).into_response()
        })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages())
            .field("handler_timeout", &self.handler_timeout)
            .finish_non_exhaustive()
    }
}

fn shaped(
    status: Status,
    payload: &Value,
    message: Option<&str>,
    pagination: Option<Value>,
    started_at: Instant,
) -> Envelope {
    Envelope::build(status, payload, message, pagination, started_at)
        .unwrap_or_else(|_| Envelope::bare(status, message, started_at))
}
