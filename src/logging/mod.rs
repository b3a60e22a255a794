//! Structured logging.
//!
//! Everything logs through [`tracing`]. This module adds two things on top:
//!
//! - [`Logger`]: an explicit handle passed to every component. By default it
//!   emits to the global subscriber; [`Logger::with_dispatch`] pins events to
//!   a specific [`Dispatch`] instead, which is how tests capture output
//!   without touching global state.
//! - [`ContextLogger`]: a facade bound to one tag (an endpoint name such as
//!   `EP:status`). Every event carries `tag`, and an optional structured
//!   `payload` serialized as JSON.
//!
//! [`install`] wires the sinks: a console layer plus, unless
//! `console_only` is set, daily-rotated JSON files under `<root>/logs/`:
//!
//! | File | Content |
//! |---|---|
//! | `app-YYYY-MM-DD.log` | info and above |
//! | `error-YYYY-MM-DD.log` | errors only |
//! | `http-YYYY-MM-DD.log` | one access line per request |
//!
//! [`console`] builds the console layer alone, for the window before the
//! configuration is known to be valid.

mod console;
mod json;
mod rolling;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Dispatch, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

pub use console::ConsoleFormat;
pub use json::JsonFileLayer;
pub use rolling::RollingFile;

/// Target of access-log events. Routed to `http-*.log` only.
pub const ACCESS_TARGET: &str = "lumen::access";

/// Sink options, derived from [`ServerConfig`](crate::ServerConfig).
#[derive(Clone, Debug)]
pub struct LogOptions {
    pub root: PathBuf,
    pub debug: bool,
    pub console_only: bool,
}

/// Builds the sinks and installs them as the global subscriber.
///
/// If the host process already set a global subscriber, that one stays in
/// place and is told so with a warning. The returned [`Logger`] is then
/// pinned to lumen's own sinks, so log files are still written.
pub fn install(options: &LogOptions) -> std::io::Result<Logger> {
    let files = if options.console_only {
        None
    } else {
        let dir = options.root.join("logs");
        let app = JsonFileLayer::new(RollingFile::new(&dir, "app")?)
            .with_filter(Targets::new()
                .with_default(LevelFilter::INFO)
                .with_target(ACCESS_TARGET, LevelFilter::OFF));
        let errors = JsonFileLayer::new(RollingFile::new(&dir, "error")?)
            .with_filter(LevelFilter::ERROR);
        let http = JsonFileLayer::new(RollingFile::new(&dir, "http")?)
            .with_filter(Targets::new().with_target(ACCESS_TARGET, LevelFilter::INFO));
        Some(app.and_then(errors).and_then(http))
    };

    let dispatch = Dispatch::new(tracing_subscriber::registry()
        .with(console_layer(options.debug, std::io::stdout))
        .with(files));

    match tracing::dispatcher::set_global_default(dispatch.clone()) {
        Ok(()) => Ok(Logger::global()),
        Err(_) => {
            tracing::warn!("A global subscriber is already set; lumen logs to its own sinks only");
            Ok(Logger::with_dispatch(dispatch))
        }
    }
}

/// A console-only [`Logger`] that never touches global state.
pub fn console(debug: bool) -> Logger {
    console_to(debug, std::io::stdout)
}

/// Like [`console`], writing to `writer` instead of stdout.
pub fn console_to<W>(debug: bool, writer: W) -> Logger
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    Logger::with_dispatch(Dispatch::new(
        tracing_subscriber::registry().with(console_layer(debug, writer)),
    ))
}

fn console_layer<S, W>(debug: bool, writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt::layer()
        .event_format(ConsoleFormat)
        .with_writer(writer)
        .with_filter(Targets::new()
            .with_default(level)
            .with_target(ACCESS_TARGET, LevelFilter::OFF))
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// Process logging handle.
///
/// Cheap to clone. Components receive one at construction instead of
/// reaching for a global.
#[derive(Clone, Debug, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Emits to whatever subscriber is globally installed.
    pub fn global() -> Self {
        Self { dispatch: None }
    }

    /// Emits to `dispatch` regardless of the global subscriber.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch: Some(dispatch) }
    }

    /// A facade that tags every event with `tag`.
    pub fn tagged(&self, tag: impl Into<Arc<str>>) -> ContextLogger {
        ContextLogger { tag: tag.into(), logger: self.clone() }
    }

    /// Writes one access-log line.
    pub fn access(&self, line: &str) {
        self.scope(|| tracing::info!(target: ACCESS_TARGET, "{line}"));
    }

    pub(crate) fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

// ── ContextLogger ─────────────────────────────────────────────────────────────

/// Logging facade bound to one tag.
#[derive(Clone, Debug)]
pub struct ContextLogger {
    tag: Arc<str>,
    logger: Logger,
}

macro_rules! level_methods {
    ($($plain:ident, $with:ident => $mac:ident;)*) => {$(
        pub fn $plain(&self, message: &str) {
            self.logger.scope(|| tracing::$mac!(tag = %self.tag, "{message}"));
        }

        pub fn $with<P: Serialize>(&self, message: &str, payload: P) {
            let payload = render_payload(&payload);
            self.logger.scope(|| tracing::$mac!(tag = %self.tag, payload = %payload, "{message}"));
        }
    )*};
}

impl ContextLogger {
    level_methods! {
        debug, debug_with => debug;
        info,  info_with  => info;
        warn,  warn_with  => warn;
        error, error_with => error;
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

fn render_payload<P: Serialize>(payload: &P) -> String {
    serde_json::to_string(payload)
        .unwrap_or_else(|e| format!("\"<unserializable payload: {e}>\""))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::Context;

    use super::*;

    #[derive(Default)]
    struct Seen(Mutex<Vec<(String, String, Option<String>)>>);

    struct Capture(Arc<Seen>);

    struct Fields {
        tag: String,
        payload: Option<String>,
    }

    impl Visit for Fields {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            match field.name() {
                "tag" => self.tag = format!("{value:?}"),
                "payload" => self.payload = Some(format!("{value:?}")),
                _ => {}
            }
        }
    }

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields { tag: String::new(), payload: None };
            event.record(&mut fields);
            self.0.0.lock().unwrap().push((
                event.metadata().level().to_string(),
                fields.tag,
                fields.payload,
            ));
        }
    }

    fn capturing() -> (Logger, Arc<Seen>) {
        let seen = Arc::new(Seen::default());
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(Capture(seen.clone())));
        (Logger::with_dispatch(dispatch), seen)
    }

    #[test]
    fn every_event_carries_the_tag() {
        let (logger, seen) = capturing();
        let log = logger.tagged("EP:status");
        log.debug("Started");
        log.error("boom");

        let seen = seen.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, tag, _)| tag == "EP:status"));
        assert_eq!(seen[1].0, "ERROR");
    }

    #[test]
    fn payload_is_nested_as_json() {
        let (logger, seen) = capturing();
        logger.tagged("EP:x").info_with("Some data here!", json!({ "foo": 123 }));

        let seen = seen.0.lock().unwrap();
        assert_eq!(seen[0].2.as_deref(), Some(r#"{"foo":123}"#));
    }

    #[test]
    fn plain_calls_have_no_payload() {
        let (logger, seen) = capturing();
        logger.tagged("EP:x").warn("careful");
        assert_eq!(seen.0.lock().unwrap()[0].2, None);
    }
}
