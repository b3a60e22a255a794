//! Authentication gate for non-public endpoints.
//!
//! lumen does not define an authentication protocol. A gate is any value
//! that looks at a [`Request`] and either lets it through or rejects it.
//! Plain closures work:
//!
//! ```rust
//! use lumen::{AuthGate, Rejection, Request};
//!
//! fn has_api_key(req: &Request) -> Result<(), Rejection> {
//!     match req.header("x-api-key") {
//!         Some("letmein") => Ok(()),
//!         _ => Err(Rejection::Unauthorized("missing api key".into())),
//!     }
//! }
//!
//! fn assert_gate<G: AuthGate>(_: G) {}
//! assert_gate(has_api_key);
//! ```

use std::collections::HashSet;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::status::Status;

/// Why a gate refused a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rejection {
    /// No or invalid credentials (401).
    Unauthorized(String),
    /// Valid credentials, insufficient rights (403).
    Forbidden(String),
}

impl Rejection {
    pub fn status(&self) -> Status {
        match self {
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized(m) | Self::Forbidden(m) => m,
        }
    }
}

/// Decides whether a request may reach a non-public handler.
pub trait AuthGate: Send + Sync + 'static {
    fn authorize<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<(), Rejection>>;
}

impl<F> AuthGate for F
where
    F: Fn(&Request) -> Result<(), Rejection> + Send + Sync + 'static,
{
    fn authorize<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<(), Rejection>> {
        let outcome = self(req);
        Box::pin(async move { outcome })
    }
}

/// The gate used when none is configured: every non-public request is refused.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAll;

impl AuthGate for DenyAll {
    fn authorize<'a>(&'a self, _req: &'a Request) -> BoxFuture<'a, Result<(), Rejection>> {
        Box::pin(async { Err(Rejection::Unauthorized("Unauthorized".into())) })
    }
}

/// Accepts `Authorization: Bearer <token>` for a fixed set of tokens.
#[derive(Clone, Debug, Default)]
pub struct BearerToken {
    tokens: HashSet<String>,
}

impl BearerToken {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tokens: tokens.into_iter().map(Into::into).collect() }
    }

    fn check(&self, req: &Request) -> Result<(), Rejection> {
        let token = req
            .header("authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| Rejection::Unauthorized("Missing bearer token".into()))?;
        if self.tokens.contains(token.trim()) {
            Ok(())
        } else {
            Err(Rejection::Unauthorized("Invalid token".into()))
        }
    }
}

impl AuthGate for BearerToken {
    fn authorize<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<(), Rejection>> {
        let outcome = self.check(req);
        Box::pin(async move { outcome })
    }
}
