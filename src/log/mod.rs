//! Structured logging with request correlation.
//!
//! The pipeline is assembled from small handlers:
//!
//! ```text
//! Logger → CorrelatingHandler → {Json,Text,Dev}Handler (+ Enricher) → FanOutWriter → sinks
//! ```
//!
//! [`factory::build`] assembles it from a [`LoggerConfig`](crate::config::LoggerConfig);
//! [`factory::init`] additionally installs it as the process default and
//! routes `tracing` events into it through [`bridge::LogLayer`].
//!
//! A [`Logger`] is a cheap handle. Pass it explicitly where possible; the
//! process-wide slot behind [`default_logger`] exists for code that has no
//! handle at hand.

pub mod bridge;
pub mod correlate;
pub mod dev;
pub mod enrich;
pub mod factory;
pub mod handler;
pub mod json;
pub mod record;
pub mod rotate;
pub mod text;
pub mod writer;

use std::{
    io,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use crate::context::RequestContext;

pub use correlate::{CorrelatingHandler, REQUEST_ID_ATTR};
pub use dev::{DevHandler, DevOptions};
pub use enrich::Enricher;
pub use handler::{HandlerOptions, LogHandler, ReplaceAttr};
pub use json::JsonHandler;
pub use record::{Attr, ErrorValue, Level, Record, Source, Value};
pub use text::TextHandler;
pub use writer::{FanOutWriter, LockedWriter, RecordWriter, StderrWriter};

static DEFAULT_LOGGER: RwLock<Option<Logger>> = RwLock::new(None);

/// Handle to a configured handler chain.
#[derive(Clone)]
pub struct Logger {
    handler: Arc<dyn LogHandler>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(handler: Arc<dyn LogHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<dyn LogHandler> {
        &self.handler
    }

    pub fn enabled(&self, ctx: Option<&RequestContext>, level: Level) -> bool {
        self.handler.enabled(ctx, level)
    }

    /// A logger whose records all carry `attrs`.
    pub fn with(&self, attrs: Vec<Attr>) -> Self {
        Self::new(self.handler.with_attrs(attrs))
    }

    /// A logger that nests further attributes under `name`.
    pub fn with_group(&self, name: &str) -> Self {
        Self::new(self.handler.with_group(name))
    }

    /// Hand a prepared record to the handler chain if its level is enabled.
    pub fn log_record(&self, ctx: Option<&RequestContext>, record: Record) -> io::Result<()> {
        if !self.enabled(ctx, record.level) {
            return Ok(());
        }
        self.handler.handle(ctx, record)
    }

    /// Emit a record. Sink errors are dropped; use [`log_record`][Self::log_record]
    /// to observe them.
    #[track_caller]
    pub fn log(
        &self,
        ctx: Option<&RequestContext>,
        level: Level,
        message: impl Into<String>,
        attrs: Vec<Attr>,
    ) {
        if !self.enabled(ctx, level) {
            return;
        }
        let mut record = Record::new(level, message).with_attrs(attrs);
        record.source = Some(Source::caller());
        let _ = self.handler.handle(ctx, record);
    }

    #[track_caller]
    pub fn trace(&self, ctx: Option<&RequestContext>, message: impl Into<String>, attrs: Vec<Attr>) {
        self.log(ctx, Level::Trace, message, attrs);
    }

    #[track_caller]
    pub fn debug(&self, ctx: Option<&RequestContext>, message: impl Into<String>, attrs: Vec<Attr>) {
        self.log(ctx, Level::Debug, message, attrs);
    }

    #[track_caller]
    pub fn info(&self, ctx: Option<&RequestContext>, message: impl Into<String>, attrs: Vec<Attr>) {
        self.log(ctx, Level::Info, message, attrs);
    }

    #[track_caller]
    pub fn warn(&self, ctx: Option<&RequestContext>, message: impl Into<String>, attrs: Vec<Attr>) {
        self.log(ctx, Level::Warn, message, attrs);
    }

    #[track_caller]
    pub fn error(&self, ctx: Option<&RequestContext>, message: impl Into<String>, attrs: Vec<Attr>) {
        self.log(ctx, Level::Error, message, attrs);
    }
}

/// Replace the process-wide default logger. The last call wins.
pub fn set_default(logger: Logger) {
    let mut slot = DEFAULT_LOGGER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *slot = Some(logger);
}

/// The process-wide default logger.
///
/// Before anything was installed this is a JSON logger on standard error at
/// `info`.
pub fn default_logger() -> Logger {
    let slot = DEFAULT_LOGGER.read().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(logger) => logger.clone(),
        None => fallback_logger().clone(),
    }
}

fn fallback_logger() -> &'static Logger {
    static FALLBACK: OnceLock<Logger> = OnceLock::new();
    FALLBACK.get_or_init(|| {
        factory::build_with_writer(
            &crate::config::LoggerConfig::default(),
            Arc::new(StderrWriter),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CaptureHandler;

    #[test]
    fn log_respects_level_and_records_call_site() {
        let capture = CaptureHandler {
            min_level: Level::Info,
            ..CaptureHandler::default()
        };
        let logger = Logger::new(Arc::new(capture.clone()));

        logger.debug(None, "hidden", vec![]);
        logger.info(None, "shown", vec![Attr::int("n", 1)]);

        let records = capture.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "shown");
        assert_eq!(records[0].attr("n"), Some(&Value::I64(1)));
        let source = records[0].source.as_ref().expect("call site");
        assert!(source.file.ends_with("mod.rs"), "{}", source.file);
    }

    #[test]
    fn log_record_reports_sink_errors() {
        let capture = CaptureHandler {
            fail_with: Some(io::ErrorKind::WriteZero),
            ..CaptureHandler::default()
        };
        let logger = Logger::new(Arc::new(capture));

        let err = logger
            .log_record(None, Record::new(Level::Error, "x"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn with_and_with_group_delegate_to_the_handler() {
        let capture = CaptureHandler::default();
        let logger = Logger::new(Arc::new(capture.clone()))
            .with(vec![Attr::string("component", "db")])
            .with_group("query");

        logger.warn(None, "slow", vec![]);

        assert_eq!(capture.captured()[0].scope, ["attrs:component", "group:query"]);
    }
}
