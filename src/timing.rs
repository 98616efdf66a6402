//! Start/finish log helper for timing a block of work.
//!
//! ```rust,ignore
//! let timer = execution_timer!(&logger, "sync users", vec![Attr::int("batch", 50)]);
//! sync_users().await?;
//! timer.finish(vec![Attr::int("synced", 48)]);
//! ```
//!
//! logs `start sync users` and then `finished sync users (1.2s)`; both records
//! carry a `caller` group, the second an `executionTime {millis, seconds}`
//! group as well.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    context::RequestContext,
    log::{Attr, Level, Logger, Record, Source},
};

/// Name of the enclosing function, without the crate-internal closure suffixes.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn marker() {}
        let mut name = ::std::any::type_name_of_val(&marker);
        name = name.strip_suffix("::marker").unwrap_or(name);
        while let Some(outer) = name.strip_suffix("::{{closure}}") {
            name = outer;
        }
        name
    }};
}

/// [`ExecutionTimer::start_at`] with the current function, file and line.
#[macro_export]
macro_rules! execution_timer {
    ($logger:expr, $label:expr, $attrs:expr $(,)?) => {
        $crate::timing::ExecutionTimer::start_at(
            $crate::log::Source {
                function: $crate::function_name!().to_owned(),
                file: file!().to_owned(),
                line: line!(),
            },
            $logger,
            $label,
            $attrs,
        )
    };
    ($logger:expr, $label:expr $(,)?) => {
        $crate::execution_timer!($logger, $label, ::std::vec::Vec::new())
    };
}

/// Logs the start of some work and, on [`finish`](Self::finish), how long it
/// took.
///
/// Records are correlated with the ambient request, if there is one.
#[derive(Debug)]
pub struct ExecutionTimer {
    logger: Logger,
    ctx: Option<Arc<RequestContext>>,
    label: String,
    attrs: Vec<Attr>,
    source: Source,
    started: Instant,
}

impl ExecutionTimer {
    /// Start timing; the caller group has no function name.
    #[track_caller]
    pub fn start(logger: &Logger, label: impl Into<String>, attrs: Vec<Attr>) -> Self {
        Self::start_at(Source::caller(), logger, label, attrs)
    }

    pub fn start_at(source: Source, logger: &Logger, label: impl Into<String>, mut attrs: Vec<Attr>) -> Self {
        attrs.push(caller_group(&source));
        let timer = Self {
            logger: logger.clone(),
            ctx: RequestContext::current(),
            label: label.into(),
            attrs,
            source,
            started: Instant::now(),
        };
        timer.emit(format!("start {}", timer.label), timer.attrs.clone());
        timer
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log completion with `extra` attributes and return the elapsed time.
    pub fn finish(self, extra: Vec<Attr>) -> Duration {
        let elapsed = self.elapsed();
        let mut attrs = self.attrs.clone();
        attrs.extend(extra);
        attrs.push(Attr::group(
            "executionTime",
            vec![
                Attr::int("millis", i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)),
                Attr::float("seconds", elapsed.as_secs_f64()),
            ],
        ));
        self.emit(format!("finished {} ({elapsed:?})", self.label), attrs);
        elapsed
    }

    fn emit(&self, message: String, attrs: Vec<Attr>) {
        let mut record = Record::new(Level::Info, message).with_attrs(attrs);
        record.source = Some(self.source.clone());
        let _ = self.logger.log_record(self.ctx.as_deref(), record);
    }
}

fn caller_group(source: &Source) -> Attr {
    let mut members = Vec::with_capacity(3);
    if !source.function.is_empty() {
        members.push(Attr::string("function", source.function.clone()));
    }
    members.push(Attr::string("file", format!("{}:{}", source.file, source.line)));
    members.push(Attr::uint("line", u64::from(source.line)));
    Attr::group("caller", members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::LoggerConfig, log::factory::build_with_writer, test_support::MemoryWriter};

    fn capture() -> (Logger, MemoryWriter) {
        let writer = MemoryWriter::new();
        (
            build_with_writer(&LoggerConfig::default(), Arc::new(writer.clone())),
            writer,
        )
    }

    #[test]
    fn logs_start_and_finish_with_timing() {
        let (logger, writer) = capture();

        let timer = crate::execution_timer!(&logger, "import", vec![Attr::string("format", "csv")]);
        let elapsed = timer.finish(vec![Attr::int("rows", 10)]);

        let lines = writer.json_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["msg"], "start import");
        assert_eq!(lines[0]["format"], "csv");
        let function = lines[0]["caller"]["function"].as_str().unwrap();
        assert!(function.ends_with("logs_start_and_finish_with_timing"), "{function}");
        assert!(lines[0]["caller"]["file"].as_str().unwrap().contains("timing.rs:"));

        assert_eq!(lines[1]["msg"], format!("finished import ({elapsed:?})"));
        assert_eq!(lines[1]["rows"], 10);
        assert!(lines[1]["executionTime"]["millis"].is_i64());
        assert!(lines[1]["executionTime"]["seconds"].is_f64());
        assert!(lines[0].get("executionTime").is_none());
    }

    #[test]
    fn plain_start_omits_the_function_name() {
        let (logger, writer) = capture();

        ExecutionTimer::start(&logger, "warmup", vec![]).finish(vec![]);

        let caller = &writer.json_lines()[0]["caller"];
        assert!(caller.get("function").is_none());
        assert!(caller["line"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn timer_records_are_correlated_with_the_ambient_request() {
        let (logger, writer) = capture();
        let ctx = Arc::new(RequestContext::new());
        ctx.set_correlation_id("X-Request-ID", "cafe".to_string());

        RequestContext::scope(Arc::clone(&ctx), async {
            let timer = ExecutionTimer::start(&logger, "step", vec![]);
            tokio::task::yield_now().await;
            timer.finish(vec![]);
        })
        .await;

        let lines = writer.json_lines();
        assert!(lines.iter().all(|l| l["request_id"] == "cafe"));
    }
}
