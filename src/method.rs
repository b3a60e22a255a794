//! HTTP method as a typed enum.
//!
//! Only the four verbs an endpoint can be registered for. Requests carrying
//! any other method never match a route and fall through to the `404`
//! envelope (CORS preflight `OPTIONS` is answered by the server before
//! routing).

use std::fmt;
use std::str::FromStr;

/// A method an endpoint can respond to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    Get,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get    => "GET",
            Self::Post   => "POST",
            Self::Put    => "PUT",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE" => Ok(Self::Delete),
            "GET"    => Ok(Self::Get),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            _        => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
