//! Newline-delimited JSON encoder.

use std::{io, sync::Arc};

use serde_json::{Map, Number};

use crate::context::RequestContext;

use super::{
    handler::{EncoderCore, HandlerOptions, LogHandler},
    record::{Attr, Level, Record, Value},
    writer::RecordWriter,
};

/// Renders each record as one JSON object per line.
///
/// Built-in keys come first (`time`, `level`, `source`, `msg`), followed by
/// the attributes in insertion order. Groups become nested objects.
#[derive(Clone)]
pub struct JsonHandler {
    core: EncoderCore,
}

impl JsonHandler {
    pub fn new(writer: Arc<dyn RecordWriter>, opts: HandlerOptions) -> Self {
        Self {
            core: EncoderCore::new(writer, opts),
        }
    }
}

impl LogHandler for JsonHandler {
    fn enabled(&self, _ctx: Option<&RequestContext>, level: Level) -> bool {
        self.core.opts.enabled(level)
    }

    fn handle(&self, _ctx: Option<&RequestContext>, record: Record) -> io::Result<()> {
        let prepared = self.core.prepare(record);
        let mut object = Map::new();
        append(&mut object, prepared.builtins);
        append(&mut object, prepared.attrs);

        let mut line = serde_json::to_vec(&serde_json::Value::Object(object))?;
        line.push(b'\n');
        self.core.writer.write_record(&line)
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

fn append(object: &mut Map<String, serde_json::Value>, attrs: Vec<Attr>) {
    for attr in attrs {
        object.insert(attr.key, to_json(attr.value));
    }
}

fn to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Str(s) => serde_json::Value::String(s),
        Value::I64(n) => serde_json::Value::from(n),
        Value::U64(n) => serde_json::Value::from(n),
        Value::F64(n) => match Number::from_f64(n) {
            Some(number) => serde_json::Value::Number(number),
            None => serde_json::Value::String(n.to_string()),
        },
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Duration(d) => {
            serde_json::Value::from(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        }
        Value::List(items) => serde_json::Value::Array(items.into_iter().map(to_json).collect()),
        Value::Group(attrs) => {
            let mut object = Map::new();
            append(&mut object, attrs);
            serde_json::Value::Object(object)
        }
        value @ (Value::Time(_) | Value::Error(_)) => serde_json::Value::String(value.to_string()),
    }
}
