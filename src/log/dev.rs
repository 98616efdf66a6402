//! Human-oriented console encoder for local development.
//!
//! ```text
//! [2024-05-15 09:03:07.042] INFO  HTTP request
//!   method: GET
//!   requestDuration:
//!     millis: 12
//!   status: 200
//!
//! ```

use std::{fmt::Write as _, io, sync::Arc};

use crate::context::RequestContext;

use super::{
    handler::{EncoderCore, HandlerOptions, LogHandler},
    record::{Attr, Level, Record, Value, LEVEL_KEY, MESSAGE_KEY, SOURCE_KEY, TIME_KEY},
    writer::RecordWriter,
};

const INDENT: &str = "  ";

/// Rendering options for [`DevHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevOptions {
    /// Lists longer than this are cut short.
    pub max_slice_print_size: usize,
    pub sort_keys: bool,
    /// Blank line between records.
    pub newline_after_log: bool,
    /// ANSI colour on the level.
    pub color: bool,
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            max_slice_print_size: 50,
            sort_keys: true,
            newline_after_log: true,
            color: false,
        }
    }
}

#[derive(Clone)]
pub struct DevHandler {
    core: EncoderCore,
    dev: DevOptions,
}

impl DevHandler {
    pub fn new(writer: Arc<dyn RecordWriter>, opts: HandlerOptions, dev: DevOptions) -> Self {
        Self {
            core: EncoderCore::new(writer, opts),
            dev,
        }
    }

    fn render_level(&self, out: &mut String, level: &str) {
        if !self.dev.color {
            let _ = write!(out, "{level:<5}");
            return;
        }
        let code = match level {
            "ERROR" => "31",
            "WARN" => "33",
            "INFO" => "32",
            "DEBUG" => "34",
            _ => "35",
        };
        let _ = write!(out, "\x1b[{code}m{level:<5}\x1b[0m");
    }

    fn render_attrs(&self, out: &mut String, depth: usize, attrs: &[Attr]) {
        let mut attrs: Vec<&Attr> = attrs.iter().collect();
        if self.dev.sort_keys {
            attrs.sort_by(|a, b| a.key.cmp(&b.key));
        }
        for attr in attrs {
            let indent = INDENT.repeat(depth);
            match &attr.value {
                Value::Group(members) => {
                    let _ = writeln!(out, "{indent}{}:", attr.key);
                    self.render_attrs(out, depth + 1, members);
                }
                Value::List(items) => {
                    let _ = writeln!(out, "{indent}{}: {}", attr.key, self.render_list(items));
                }
                value => {
                    let text = value.to_string();
                    if text.contains('\n') {
                        let _ = writeln!(out, "{indent}{}:", attr.key);
                        let nested = INDENT.repeat(depth + 1);
                        for line in text.lines() {
                            let _ = writeln!(out, "{nested}{line}");
                        }
                    } else {
                        let _ = writeln!(out, "{indent}{}: {text}", attr.key);
                    }
                }
            }
        }
    }

    fn render_list(&self, items: &[Value]) -> String {
        let limit = self.dev.max_slice_print_size;
        let shown: Vec<String> = items.iter().take(limit).map(Value::to_string).collect();
        let mut rendered = format!("[{}", shown.join(", "));
        if items.len() > limit {
            let _ = write!(rendered, ", … +{} more", items.len() - limit);
        }
        rendered.push(']');
        rendered
    }
}

impl LogHandler for DevHandler {
    fn enabled(&self, _ctx: Option<&RequestContext>, level: Level) -> bool {
        self.core.opts.enabled(level)
    }

    fn handle(&self, _ctx: Option<&RequestContext>, record: Record) -> io::Result<()> {
        let prepared = self.core.prepare(record);
        let mut out = String::new();

        match prepared.builtin(TIME_KEY) {
            Some(Value::Time(t)) => {
                let _ = write!(out, "[{}] ", t.format("%H:%M:%S%.3f"));
            }
            Some(other) => {
                let _ = write!(out, "[{other}] ");
            }
            None => {}
        }
        if let Some(level) = prepared.builtin(LEVEL_KEY) {
            self.render_level(&mut out, &level.to_string());
        }
        if let Some(message) = prepared.builtin(MESSAGE_KEY) {
            let _ = write!(out, " {message}");
        }
        out.push('\n');

        if let Some(Value::Group(source)) = prepared.builtin(SOURCE_KEY) {
            let file = source.iter().find(|a| a.key == "file").map(|a| a.value.to_string());
            let line = source.iter().find(|a| a.key == "line").map(|a| a.value.to_string());
            if let (Some(file), Some(line)) = (file, line) {
                let _ = writeln!(out, "{INDENT}@ {file}:{line}");
            }
        }

        self.render_attrs(&mut out, 1, &prepared.attrs);
        if self.dev.newline_after_log {
            out.push('\n');
        }
        self.core.writer.write_record(out.as_bytes())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            core: self.core.with_attrs(attrs),
            dev: self.dev,
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            core: self.core.with_group(name),
            dev: self.dev,
        })
    }
}
