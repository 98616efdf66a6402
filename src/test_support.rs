//! Shared helpers for unit tests.

use std::{
    io,
    sync::{Arc, Mutex},
};

use crate::{
    context::RequestContext,
    log::{Attr, Level, LogHandler, Record, RecordWriter},
};

/// In-memory sink.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).expect("utf-8 log output")
    }

    pub fn json_lines(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .map(|line| serde_json::from_str(line).expect("json log line"))
            .collect()
    }
}

impl RecordWriter for MemoryWriter {
    fn write_record(&self, record: &[u8]) -> io::Result<()> {
        self.buffer.lock().unwrap().extend_from_slice(record);
        Ok(())
    }
}

/// A record as seen by [`CaptureHandler`], with the scope it arrived through.
#[derive(Debug, Clone)]
pub struct Captured {
    pub scope: Vec<String>,
    pub record: Record,
}

/// Handler that remembers what it was asked to do.
#[derive(Clone)]
pub struct CaptureHandler {
    pub records: Arc<Mutex<Vec<Captured>>>,
    /// Scoping calls that produced this handler, e.g. `group:http`.
    pub scope: Vec<String>,
    pub min_level: Level,
    pub fail_with: Option<io::ErrorKind>,
}

impl Default for CaptureHandler {
    fn default() -> Self {
        Self {
            records: Arc::default(),
            scope: Vec::new(),
            min_level: Level::Trace,
            fail_with: None,
        }
    }
}

impl CaptureHandler {
    pub fn captured(&self) -> Vec<Captured> {
        self.records.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.captured().into_iter().map(|c| c.record).collect()
    }
}

impl LogHandler for CaptureHandler {
    fn enabled(&self, _ctx: Option<&RequestContext>, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, _ctx: Option<&RequestContext>, record: Record) -> io::Result<()> {
        if let Some(kind) = self.fail_with {
            return Err(io::Error::new(kind, "capture failure"));
        }
        self.records.lock().unwrap().push(Captured {
            scope: self.scope.clone(),
            record,
        });
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn LogHandler> {
        let keys: Vec<String> = attrs.into_iter().map(|a| a.key).collect();
        let mut next = self.clone();
        next.scope.push(format!("attrs:{}", keys.join(",")));
        Arc::new(next)
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogHandler> {
        let mut next = self.clone();
        next.scope.push(format!("group:{name}"));
        Arc::new(next)
    }
}
