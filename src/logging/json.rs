//! Tracing layer that writes events as JSON lines to a [`RollingFile`].
//!
//! Record shape:
//!
//! ```json
//! {"process":"api","pid":4242,"level":"error","tagLabel":"EP:status",
//!  "timestamp":"2026-10-19T08:12:03.412Z","message":"Controller crash","payload":null}
//! ```
//!
//! `payload` is the event's `payload` field parsed back into JSON. Events
//! without one get their remaining fields as an object (or `null`).

use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::RollingFile;

/// Writes every event it sees to one rolling file.
#[derive(Debug)]
pub struct JsonFileLayer {
    file: Mutex<RollingFile>,
    process: String,
    pid: u32,
}

impl JsonFileLayer {
    pub fn new(file: RollingFile) -> Self {
        Self {
            file: Mutex::new(file),
            process: process_name(),
            pid: std::process::id(),
        }
    }
}

#[derive(Serialize)]
struct Record<'a> {
    process: &'a str,
    pid: u32,
    level: &'a str,
    #[serde(rename = "tagLabel")]
    tag_label: Option<&'a str>,
    timestamp: String,
    message: &'a str,
    payload: Value,
}

/// Visitor that extracts the fields lumen cares about.
#[derive(Default)]
pub(super) struct FieldVisitor {
    pub(super) message: String,
    pub(super) tag: Option<String>,
    pub(super) payload: Option<String>,
    pub(super) rest: Map<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        self.rest.insert(field.name().to_owned(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_owned(),
            "tag" => self.tag = Some(value.to_owned()),
            "payload" => self.payload = Some(value.to_owned()),
            _ => self.put(field, Value::String(value.to_owned())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }
}

impl<S> Layer<S> for JsonFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let payload = match fields.payload {
            Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            None if fields.rest.is_empty() => Value::Null,
            None => Value::Object(fields.rest),
        };

        let record = Record {
            process: &self.process,
            pid: self.pid,
            level: level_str(*event.metadata().level()),
            tag_label: fields.tag.as_deref(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message: &fields.message,
            payload,
        };

        let Ok(mut line) = serde_json::to_vec(&record) else { return };
        line.push(b'\n');

        let mut file = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = file.write_line(&line, Utc::now().date_naive()) {
            eprintln!("lumen: log file write failed: {e}");
        }
    }
}

fn level_str(level: Level) -> &'static str {
    if level == Level::ERROR {
        "error"
    } else if level == Level::WARN {
        "warn"
    } else if level == Level::INFO {
        "info"
    } else if level == Level::DEBUG {
        "debug"
    } else {
        "trace"
    }
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "lumen".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn writes_one_json_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let layer = JsonFileLayer::new(RollingFile::new(dir.path(), "app").unwrap());
        let logger = Logger::with_dispatch(tracing::Dispatch::new(
            tracing_subscriber::registry().with(layer),
        ));

        logger.tagged("EP:status").error_with("Controller crash", serde_json::json!({ "id": 9 }));
        logger.tagged("rateLimiter").warn("Too many requests");

        let today = Utc::now().date_naive();
        let path = dir.path().join(format!("app-{}.log", today.format("%Y-%m-%d")));
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "error");
        assert_eq!(lines[0]["tagLabel"], "EP:status");
        assert_eq!(lines[0]["message"], "Controller crash");
        assert_eq!(lines[0]["payload"], serde_json::json!({ "id": 9 }));
        assert_eq!(lines[0]["pid"], std::process::id());
        assert_eq!(lines[1]["payload"], Value::Null);
    }
}
