//! HTTP status codes the envelope layer can emit.
//!
//! Every envelope carries its status twice: once on the wire and once as the
//! `code` field. Using [`Status`] instead of a bare `u16` keeps the
//! invariant that `code` is always a real HTTP status.
//!
//! ```rust
//! use lumen::Status;
//!
//! assert_eq!(u16::from(Status::TooManyRequests), 429);
//! ```

/// Status codes produced by lumen.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    NoContent,           // 204  (CORS preflight)

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    RequestTimeout,      // 408
    Conflict,            // 409
    ContentTooLarge,     // 413
    TooManyRequests,     // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    ServiceUnavailable,  // 503
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                  => 200,
            Status::NoContent           => 204,
            Status::BadRequest          => 400,
            Status::Unauthorized        => 401,
            Status::Forbidden           => 403,
            Status::NotFound            => 404,
            Status::RequestTimeout      => 408,
            Status::Conflict            => 409,
            Status::ContentTooLarge     => 413,
            Status::TooManyRequests     => 429,
            Status::InternalServerError => 500,
            Status::ServiceUnavailable  => 503,
        }
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> http::StatusCode {
        match s {
            Status::Ok                  => http::StatusCode::OK,
            Status::NoContent           => http::StatusCode::NO_CONTENT,
            Status::BadRequest          => http::StatusCode::BAD_REQUEST,
            Status::Unauthorized        => http::StatusCode::UNAUTHORIZED,
            Status::Forbidden           => http::StatusCode::FORBIDDEN,
            Status::NotFound            => http::StatusCode::NOT_FOUND,
            Status::RequestTimeout      => http::StatusCode::REQUEST_TIMEOUT,
            Status::Conflict            => http::StatusCode::CONFLICT,
            Status::ContentTooLarge     => http::StatusCode::PAYLOAD_TOO_LARGE,
            Status::TooManyRequests     => http::StatusCode::TOO_MANY_REQUESTS,
            Status::InternalServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Status::ServiceUnavailable  => http::StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_http_codes_agree() {
        let all = [
            Status::Ok,
            Status::NoContent,
            Status::BadRequest,
            Status::Unauthorized,
            Status::Forbidden,
            Status::NotFound,
            Status::RequestTimeout,
            Status::Conflict,
            Status::ContentTooLarge,
            Status::TooManyRequests,
            Status::InternalServerError,
            Status::ServiceUnavailable,
        ];
        for s in all {
            assert_eq!(u16::from(s), http::StatusCode::from(s).as_u16());
        }
    }
}
