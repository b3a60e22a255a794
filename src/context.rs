//! Per-request handler context.
//!
//! A handler receives one [`Ctx`] and answers through its helpers:
//!
//! ```rust
//! use lumen::{ApiError, Ctx};
//!
//! async fn status(ctx: Ctx) -> Result<(), ApiError> {
//!     ctx.logger().debug_with("Some data here!", serde_json::json!({ "foo": 123 }));
//!     ctx.resolve("Hello!");
//!     Ok(())
//! }
//! ```
//!
//! The first helper call wins. Later calls in the same request are logged
//! and dropped.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::envelope::{aggregation_body, Envelope};
use crate::error::ApiError;
use crate::logging::ContextLogger;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Where a handler's answer is parked until the pipeline writes it.
#[derive(Debug, Default)]
pub(crate) struct ResponseSlot {
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    response: Option<Response>,
    request_time: Option<String>,
    pagination: Option<Value>,
}

impl ResponseSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `response` unless one is already there. Returns whether it was stored.
    fn fill(&self, response: Response, request_time: Option<String>) -> bool {
        let mut state = self.lock();
        if state.response.is_some() {
            return false;
        }
        state.response = Some(response);
        state.request_time = request_time;
        true
    }

    pub(crate) fn take(&self) -> Option<Response> {
        self.lock().response.take()
    }

    pub(crate) fn request_time(&self) -> Option<String> {
        self.lock().request_time.clone()
    }

    pub(crate) fn pagination(&self) -> Option<Value> {
        self.lock().pagination.clone()
    }

    fn set_pagination(&self, value: Value) {
        self.lock().pagination = Some(value);
    }
}

/// Everything a handler gets for one request.
#[derive(Debug)]
pub struct Ctx {
    req: Request,
    body: Value,
    logger: ContextLogger,
    slot: Arc<ResponseSlot>,
}

impl Ctx {
    pub(crate) fn new(req: Request, body: Value, logger: ContextLogger, slot: Arc<ResponseSlot>) -> Self {
        Self { req, body, logger, slot }
    }

    pub fn req(&self) -> &Request { &self.req }
    pub fn logger(&self) -> &ContextLogger { &self.logger }

    /// The parsed JSON body, `null` when the request had none.
    pub fn body(&self) -> &Value { &self.body }

    /// Shortcut for `ctx.req().param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> { self.req.param(key) }

    /// Deserializes the body. A mismatch is a [`ApiError::Validation`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        T::deserialize(&self.body)
            .map_err(|e| ApiError::validation(json!({ "body": e.to_string() })))
    }

    // ── Response helpers ──────────────────────────────────────────────────────

    /// `200` with `payload` as `data`.
    pub fn resolve<T: Serialize>(&self, payload: T) {
        self.shape(Status::Ok, &payload, None);
    }

    /// `400` with `payload` as `data`.
    pub fn bad_request<T: Serialize>(&self, payload: T) {
        self.shape(Status::BadRequest, &payload, None);
    }

    pub fn unauthorized(&self, message: &str) {
        self.shape(Status::Unauthorized, &Value::Null, Some(message));
    }

    pub fn forbidden(&self, message: &str) {
        self.shape(Status::Forbidden, &Value::Null, Some(message));
    }

    pub fn not_found(&self) {
        self.shape(Status::NotFound, &Value::Null, None);
    }

    pub fn timeout(&self, message: &str) {
        self.shape(Status::RequestTimeout, &Value::Null, Some(message));
    }

    /// `409` with `{ "reason": reason }` as `data`.
    pub fn conflict(&self, reason: &str, message: &str) {
        self.shape(Status::Conflict, &json!({ "reason": reason }), Some(message));
    }

    pub fn too_many_requests(&self, message: &str) {
        self.shape(Status::TooManyRequests, &Value::Null, Some(message));
    }

    pub fn application_error(&self, message: &str) {
        self.shape(Status::InternalServerError, &Value::Null, Some(message));
    }

    pub fn unavailable(&self, message: &str) {
        self.shape(Status::ServiceUnavailable, &Value::Null, Some(message));
    }

    /// `200` with `{ "code": 200, ...payload }`, bypassing envelope shaping.
    pub fn aggregation_resolve<T: Serialize>(&self, payload: T) {
        match aggregation_body(&payload).and_then(|body| serde_json::to_vec(&body)) {
            Ok(bytes) => self.fill(Response::json(Status::Ok, bytes), None),
            Err(e) => self.serialization_failed(&e),
        }
    }

    /// Attaches `pagination` to whatever envelope this request sends next.
    pub fn set_pagination<T: Serialize>(&self, pagination: T) -> &Self {
        match serde_json::to_value(pagination) {
            Ok(value) => self.slot.set_pagination(value),
            Err(e) => self.logger.warn_with("Pagination dropped", json!({ "error": e.to_string() })),
        }
        self
    }

    fn shape<T: Serialize + ?Sized>(&self, status: Status, payload: &T, message: Option<&str>) {
        let built = Envelope::build(
            status,
            payload,
            message,
            self.slot.pagination(),
            self.req.started_at(),
        );
        match built {
            Ok(envelope) => {
                let request_time = envelope.request_time.clone();
                self.fill(envelope.into_response(), Some(request_time));
            }
            Err(e) => self.serialization_failed(&e),
        }
    }

    fn serialization_failed(&self, e: &serde_json::Error) {
        self.logger.error_with("Response serialization failed", json!({ "error": e.to_string() }));
        let envelope = Envelope::bare(Status::InternalServerError, None, self.req.started_at());
        let request_time = envelope.request_time.clone();
        self.fill(envelope.into_response(), Some(request_time));
    }

    fn fill(&self, response: Response, request_time: Option<String>) {
        let status = u16::from(response.status());
        if !self.slot.fill(response, request_time) {
            self.logger.warn_with("Response already sent", json!({ "ignored": status }));
        }
    }
}
