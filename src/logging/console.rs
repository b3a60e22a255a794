//! Human-readable console lines:
//!
//! ```text
//! 08:12:03 | ERROR | EP:status            | Controller crash | {"id":9}
//! ```
//!
//! The tag column is cut or padded to 20 characters. Untagged events show
//! `anonymous`. The payload column is omitted when the event has none.

use std::fmt;

use chrono::Local;
use serde_json::Value;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use super::json::FieldVisitor;

const TAG_WIDTH: usize = 20;

/// [`FormatEvent`] for the console layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let tag: String = fields.tag.as_deref().unwrap_or("anonymous").chars().take(TAG_WIDTH).collect();
        write!(
            writer,
            "{} | {} | {:<width$} | {}",
            Local::now().format("%H:%M:%S"),
            label(*event.metadata().level()),
            tag,
            fields.message,
            width = TAG_WIDTH,
        )?;

        match fields.payload {
            Some(payload) => write!(writer, " | {payload}")?,
            None if !fields.rest.is_empty() => write!(writer, " | {}", Value::Object(fields.rest))?,
            None => {}
        }
        writeln!(writer)
    }
}

fn label(level: Level) -> &'static str {
    if level == Level::ERROR {
        "ERROR"
    } else if level == Level::WARN {
        "WARN "
    } else if level == Level::INFO {
        "INFO "
    } else if level == Level::DEBUG {
        "DEBUG"
    } else {
        "TRACE"
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::logging::Logger;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn rendered(emit: impl FnOnce(&Logger)) -> Vec<String> {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(ConsoleFormat)
            .with_writer(move || writer.clone());
        let logger = Logger::with_dispatch(tracing::Dispatch::new(tracing_subscriber::registry().with(layer)));
        emit(&logger);

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap().lines().map(str::to_owned).collect()
    }

    #[test]
    fn columns_are_time_level_tag_message_payload() {
        let lines = rendered(|logger| {
            logger.tagged("EP:status").error_with("Controller crash", json!({ "id": 9 }));
        });

        let columns: Vec<&str> = lines[0].split(" | ").collect();
        assert_eq!(columns.len(), 5, "{}", lines[0]);
        assert_eq!(columns[0].len(), "08:12:03".len());
        assert_eq!(columns[1], "ERROR");
        assert_eq!(columns[2], format!("{:<20}", "EP:status"));
        assert_eq!(columns[3], "Controller crash");
        assert_eq!(columns[4], r#"{"id":9}"#);
    }

    #[test]
    fn long_tags_are_cut_and_plain_events_have_no_payload() {
        let lines = rendered(|logger| {
            logger.tagged("EP:a_really_long_endpoint_name").info("Started");
            logger.scope(|| tracing::warn!("no tag here"));
        });

        assert_eq!(lines[0].split(" | ").nth(2), Some("EP:a_really_long_end"));
        assert_eq!(lines[0].split(" | ").count(), 4);
        assert!(lines[1].contains("| WARN  | anonymous            | no tag here"), "{}", lines[1]);
    }

    #[test]
    fn console_logger_works_without_a_global_subscriber() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let log = crate::logging::console_to(false, move || writer.clone()).tagged("lumen");

        log.debug("hidden unless debug");
        log.error_with("Invalid server configuration", json!({ "error": "bad size" }));

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 1, "{text}");
        assert!(text.contains("| Invalid server configuration | {\"error\":\"bad size\"}"), "{text}");
        assert!(!tracing::dispatcher::has_been_set());
    }
}
