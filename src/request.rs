//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use http::HeaderMap;

use crate::method::Method;

/// An incoming HTTP request, body fully buffered.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) started_at: Instant,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        method: Method,
        body: Bytes,
        params: HashMap<String, String>,
        remote_addr: SocketAddr,
        started_at: Instant,
    ) -> Self {
        Self {
            method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers,
            body,
            params,
            remote_addr,
            started_at,
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// When the request entered the pipeline. `requestTime` is measured from here.
    pub fn started_at(&self) -> Instant { self.started_at }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Path plus query string, as the client sent it.
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// The rate-limit identifier: the peer's IP address.
    pub(crate) fn client_id(&self) -> String {
        self.remote_addr.ip().to_string()
    }
}
