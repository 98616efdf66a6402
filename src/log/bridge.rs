//! `tracing` integration.
//!
//! [`LogLayer`] turns every `tracing` event into a [`Record`] and hands it to
//! a [`Logger`], so code instrumented with `tracing::info!` and friends ends
//! up in the same encoders and sinks, correlated with the current request.
//!
//! - The `message` field becomes the record message.
//! - Dotted field names (`requestDuration.millis`) become nested groups.
//! - Fields of the enclosing spans come first, outermost span first.
//! - Fields recorded as `&dyn Error` become error values and are eligible
//!   for stack expansion.

use std::{error::Error as StdError, fmt};

use tracing::{
    field::{Field, Visit},
    span, Event, Subscriber,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::context::RequestContext;

use super::{
    default_logger,
    record::{insert_dotted, Attr, ErrorValue, Level, Record, Source, Value},
    Logger,
};

const MESSAGE_FIELD: &str = "message";

/// Forwards `tracing` events to a [`Logger`].
#[derive(Debug, Clone)]
pub struct LogLayer {
    target: Target,
}

#[derive(Debug, Clone)]
enum Target {
    Fixed(Logger),
    /// Resolved per event, so a later `set_default` takes effect.
    ProcessDefault,
}

impl LogLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            target: Target::Fixed(logger),
        }
    }

    pub fn process_default() -> Self {
        Self {
            target: Target::ProcessDefault,
        }
    }

    fn logger(&self) -> Logger {
        match &self.target {
            Target::Fixed(logger) => logger.clone(),
            Target::ProcessDefault => default_logger(),
        }
    }
}

/// Span fields, kept in the span's extensions.
#[derive(Debug, Default)]
struct SpanFields(Vec<Attr>);

struct FieldVisitor<'a> {
    attrs: &'a mut Vec<Attr>,
    message: Option<String>,
    /// Span fields treat `message` as an ordinary attribute.
    capture_message: bool,
}

impl<'a> FieldVisitor<'a> {
    fn for_event(attrs: &'a mut Vec<Attr>) -> Self {
        Self {
            attrs,
            message: None,
            capture_message: true,
        }
    }

    fn for_span(attrs: &'a mut Vec<Attr>) -> Self {
        Self {
            attrs,
            message: None,
            capture_message: false,
        }
    }

    fn put(&mut self, field: &Field, value: Value) {
        if self.capture_message && field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
            return;
        }
        insert_dotted(self.attrs, field.name(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::Str(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        self.put(field, Value::Error(ErrorValue::from_dyn(value)));
    }
}

impl<S> Layer<S> for LogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::default();
        attrs.record(&mut FieldVisitor::for_span(&mut fields.0));
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor::for_span(&mut fields.0));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Level::from(*meta.level());
        let request = RequestContext::current();
        let logger = self.logger();
        if !logger.enabled(request.as_deref(), level) {
            return;
        }

        let mut attrs = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    attrs.extend(fields.0.iter().cloned());
                }
            }
        }
        let message = {
            let mut visitor = FieldVisitor::for_event(&mut attrs);
            event.record(&mut visitor);
            visitor.message.unwrap_or_default()
        };

        let mut record = Record::new(level, message).with_attrs(attrs);
        record.source = meta.file().map(|file| Source {
            function: String::new(),
            file: file.to_owned(),
            line: meta.line().unwrap_or(0),
        });
        let _ = logger.log_record(request.as_deref(), record);
    }
}
