//! `key=value` text encoder.

use std::{fmt::Write as _, io, sync::Arc};

use crate::context::RequestContext;

use super::{
    handler::{EncoderCore, HandlerOptions, LogHandler},
    record::{Attr, Level, Record, Value},
    writer::RecordWriter,
};

/// Renders each record as a single line of space-separated `key=value`
/// pairs. Group members are written with dotted keys (`http.status=200`).
#[derive(Clone)]
pub struct TextHandler {
    core: EncoderCore,
}

impl TextHandler {
    pub fn new(writer: Arc<dyn RecordWriter>, opts: HandlerOptions) -> Self {
        Self {
            core: EncoderCore::new(writer, opts),
        }
    }
}

impl LogHandler for TextHandler {
    fn enabled(&self, _ctx: Option<&RequestContext>, level: Level) -> bool {
        self.core.opts.enabled(level)
    }

    fn handle(&self, _ctx: Option<&RequestContext>, record: Record) -> io::Result<()> {
        let prepared = self.core.prepare(record);
        let mut line = String::new();
        for attr in prepared.builtins.iter().chain(prepared.attrs.iter()) {
            write_attr(&mut line, "", attr);
        }
        line.push('\n');
        self.core.writer.write_record(line.as_bytes())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            core: self.core.with_attrs(attrs),
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            core: self.core.with_group(name),
        })
    }
}

fn write_attr(line: &mut String, prefix: &str, attr: &Attr) {
    let key = if prefix.is_empty() {
        attr.key.clone()
    } else {
        format!("{prefix}.{}", attr.key)
    };

    if let Value::Group(members) = &attr.value {
        for member in members {
            write_attr(line, &key, member);
        }
        return;
    }

    if !line.is_empty() {
        line.push(' ');
    }
    let _ = write!(line, "{}={}", quote(&key), quote(&attr.value.to_string()));
}

fn quote(s: &str) -> String {
    if needs_quoting(s) {
        format!("{s:?}")
    } else {
        s.to_owned()
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '=' | '"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryWriter;

    #[test]
    fn renders_key_value_pairs() {
        let writer = MemoryWriter::new();
        let handler = TextHandler::new(Arc::new(writer.clone()), HandlerOptions::default());

        handler
            .handle(
                None,
                Record::new(Level::Warn, "HTTP request").with_attrs([
                    Attr::int("status", 404),
                    Attr::string("path", "/missing"),
                    Attr::string("note", ""),
                ]),
            )
            .unwrap();

        let line = writer.contents();
        assert!(line.starts_with("time="), "{line}");
        assert!(line.ends_with('\n'));
        assert!(line.contains(" level=WARN msg=\"HTTP request\" status=404 path=/missing note=\"\""), "{line}");
    }

    #[test]
    fn groups_use_dotted_keys() {
        let writer = MemoryWriter::new();
        let handler = TextHandler::new(Arc::new(writer.clone()), HandlerOptions::default())
            .with_group("http");

        handler
            .handle(
                None,
                Record::new(Level::Info, "ok").with_attrs([Attr::group(
                    "requestDuration",
                    vec![Attr::int("millis", 12)],
                )]),
            )
            .unwrap();

        assert!(writer.contents().contains(" http.requestDuration.millis=12"));
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote("a=b"), "\"a=b\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("line\nbreak"), "\"line\\nbreak\"");
    }
}
