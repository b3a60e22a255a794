//! Outgoing HTTP response type.
//!
//! Handlers never build one of these directly: the [`Ctx`](crate::Ctx)
//! helpers shape an [`Envelope`](crate::Envelope) and the pipeline turns it
//! into a `Response`. The type is public so auth gates and tests can inspect
//! what goes on the wire.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::Full;

use crate::status::Status;

/// An outgoing HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: Status,
}

impl Response {
    /// `application/json` response with the given status.
    pub fn json(status: Status, body: Vec<u8>) -> Self {
        Self {
            body,
            headers: vec![("content-type".to_owned(), "application/json".to_owned())],
            status,
        }
    }

    /// Response with no body.
    pub fn empty(status: Status) -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status }
    }

    /// Appends a header. Returns `self` for chaining.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status(&self) -> Status { self.status }
    pub fn body(&self) -> &[u8] { &self.body }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the `http` type hyper writes to the socket.
    ///
    /// Headers whose name or value is not valid on the wire are dropped.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status.into();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                res.headers_mut().append(name, value);
            }
        }
        res
    }
}
