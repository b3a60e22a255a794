//! The uniform response envelope.
//!
//! Every response lumen writes (success, client error, rate-limit rejection,
//! crash) has the same shape:
//!
//! ```json
//! { "code": 200, "data": { … }, "message": "…", "pagination": { … }, "requestTime": "3ms" }
//! ```
//!
//! `code` mirrors the HTTP status. `data`, `message` and `pagination` are
//! omitted when empty. `requestTime` is always present.
//!
//! # Public projections
//!
//! Domain types often carry fields that must never reach a client. Implement
//! [`PublicFields`] and wrap the value in [`Public`] before resolving it; only
//! the projection is serialized, element by element for collections.
//!
//! ```rust
//! use lumen::{Public, PublicFields};
//! use serde::Serialize;
//!
//! struct User { id: u64, name: String, password_hash: String }
//!
//! #[derive(Serialize)]
//! struct UserView<'a> { id: u64, name: &'a str }
//!
//! impl PublicFields for User {
//!     type View<'a> = UserView<'a>;
//!     fn public_fields(&self) -> UserView<'_> {
//!         UserView { id: self.id, name: &self.name }
//!     }
//! }
//!
//! let users = vec![User { id: 1, name: "ada".into(), password_hash: "x".into() }];
//! let json = serde_json::to_value(Public::all(users)).unwrap();
//! assert_eq!(json, serde_json::json!([{ "id": 1, "name": "ada" }]));
//! ```

use std::time::Instant;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::response::Response;
use crate::status::Status;

/// Wire shape of every response body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(serialize_with = "serialize_code")]
    pub code: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
    #[serde(rename = "requestTime")]
    pub request_time: String,
}

impl Envelope {
    /// Shapes `payload` into an envelope.
    ///
    /// Fails only if `payload` cannot be represented as JSON (for example a
    /// map with non-string keys).
    pub fn build<T>(
        status: Status,
        payload: &T,
        message: Option<&str>,
        pagination: Option<Value>,
        started_at: Instant,
    ) -> serde_json::Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_value(payload)?;
        Ok(Self {
            code: status,
            data: is_truthy(&data).then_some(data),
            message: message.filter(|m| !m.is_empty()).map(str::to_owned),
            pagination,
            request_time: request_time(started_at),
        })
    }

    /// An envelope with no `data`.
    pub fn bare(status: Status, message: Option<&str>, started_at: Instant) -> Self {
        Self {
            code: status,
            data: None,
            message: message.filter(|m| !m.is_empty()).map(str::to_owned),
            pagination: None,
            request_time: request_time(started_at),
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.code;
        // Envelope fields are plain JSON values; serialization cannot fail.
        let body = serde_json::to_vec(&self).unwrap_or_default();
        Response::json(status, body)
    }
}

/// Builds the `{ "code": 200, ...payload }` body of an aggregation response.
///
/// No projection, no `data` wrapping, no `requestTime`. A payload that is
/// not a JSON object contributes no keys.
pub fn aggregation_body<T>(payload: &T) -> serde_json::Result<Value>
where
    T: Serialize + ?Sized,
{
    let mut body = Map::new();
    body.insert("code".to_owned(), Value::from(200u16));
    if let Value::Object(fields) = serde_json::to_value(payload)? {
        body.extend(fields);
    }
    Ok(Value::Object(body))
}

/// `"<elapsed>ms"` since `started_at`.
pub(crate) fn request_time(started_at: Instant) -> String {
    format!("{}ms", started_at.elapsed().as_millis())
}

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy, everything else
/// (including empty arrays and objects) is truthy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn serialize_code<S: Serializer>(code: &Status, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(u16::from(*code))
}

// ── Public projection ─────────────────────────────────────────────────────────

/// A sanitized, client-facing representation of a value.
pub trait PublicFields {
    type View<'a>: Serialize
    where
        Self: 'a;

    fn public_fields(&self) -> Self::View<'_>;
}

/// Serializes `T` through its [`PublicFields`] projection.
#[derive(Clone, Debug)]
pub struct Public<T>(pub T);

impl<T> Public<T> {
    /// Wraps every element, preserving order.
    pub fn all<I>(items: I) -> Vec<Public<T>>
    where
        I: IntoIterator<Item = T>,
    {
        items.into_iter().map(Public).collect()
    }
}

impl<T: PublicFields> Serialize for Public<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.public_fields().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Account {
        id: u32,
        email: String,
        secret: String,
    }

    #[derive(Serialize)]
    struct AccountView<'a> {
        id: u32,
        email: &'a str,
    }

    impl PublicFields for Account {
        type View<'a> = AccountView<'a>;
        fn public_fields(&self) -> AccountView<'_> {
            AccountView { id: self.id, email: &self.email }
        }
    }

    fn account(id: u32) -> Account {
        Account { id, email: format!("{id}@example.com"), secret: "hunter2".into() }
    }

    #[test]
    fn resolve_shape_has_code_data_and_request_time() {
        let env = Envelope::build(Status::Ok, "Hello!", None, None, Instant::now()).unwrap();
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["code"], 200);
        assert_eq!(json["data"], "Hello!");
        assert!(json.get("message").is_none());
        assert!(json.get("pagination").is_none());
        let t = json["requestTime"].as_str().unwrap();
        assert!(t.strip_suffix("ms").unwrap().parse::<u64>().is_ok());
    }

    #[test]
    fn falsy_payloads_drop_data() {
        for payload in [json!(null), json!(false), json!(0), json!("")] {
            let env = Envelope::build(Status::Ok, &payload, None, None, Instant::now()).unwrap();
            assert_eq!(env.data, None, "payload {payload}");
        }
        let env = Envelope::build(Status::Ok, &json!([]), None, None, Instant::now()).unwrap();
        assert_eq!(env.data, Some(json!([])));
    }

    #[test]
    fn empty_message_is_omitted() {
        let env = Envelope::bare(Status::Forbidden, Some(""), Instant::now());
        assert_eq!(env.message, None);
        let env = Envelope::bare(Status::Forbidden, Some("nope"), Instant::now());
        assert_eq!(env.message.as_deref(), Some("nope"));
    }

    #[test]
    fn projection_never_leaks_private_fields() {
        let acc = account(7);
        assert_eq!(acc.secret, "hunter2");
        let env = Envelope::build(Status::Ok, &Public(acc), None, None, Instant::now()).unwrap();
        assert_eq!(env.data, Some(json!({ "id": 7, "email": "7@example.com" })));
    }

    #[test]
    fn projection_applies_per_element_in_order() {
        let list = Public::all(vec![account(3), account(1), account(2)]);
        let env = Envelope::build(Status::Ok, &list, None, None, Instant::now()).unwrap();
        let ids: Vec<_> = env.data.unwrap().as_array().unwrap().iter()
            .map(|v| v["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn aggregation_spreads_object_fields() {
        assert_eq!(aggregation_body(&json!({ "foo": 1 })).unwrap(), json!({ "code": 200, "foo": 1 }));
        assert_eq!(aggregation_body(&json!([1, 2])).unwrap(), json!({ "code": 200 }));
    }

    #[test]
    fn into_response_uses_code_as_status() {
        let res = Envelope::bare(Status::Conflict, None, Instant::now()).into_response();
        assert_eq!(res.status(), Status::Conflict);
        assert_eq!(res.header("content-type"), Some("application/json"));
    }
}
