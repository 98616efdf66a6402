//! Output sinks.
//!
//! Encoders render a whole record into a buffer and hand it over in one
//! [`RecordWriter::write_record`] call. Every sink serialises those calls, so
//! records from concurrent requests interleave but never split.

use std::{
    fmt,
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

/// A sink that accepts fully encoded records.
pub trait RecordWriter: Send + Sync {
    fn write_record(&self, record: &[u8]) -> io::Result<()>;
}

/// Standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrWriter;

impl RecordWriter for StderrWriter {
    fn write_record(&self, record: &[u8]) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(record)?;
        stderr.flush()
    }
}

/// Adapts any [`Write`] into a [`RecordWriter`] by locking around each record.
pub struct LockedWriter<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> LockedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<W> fmt::Debug for LockedWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedWriter").finish_non_exhaustive()
    }
}

impl<W: Write + Send> RecordWriter for LockedWriter<W> {
    fn write_record(&self, record: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.write_all(record)?;
        inner.flush()
    }
}

/// Writes every record to all of its sinks.
#[derive(Clone, Default)]
pub struct FanOutWriter {
    sinks: Vec<Arc<dyn RecordWriter>>,
}

impl fmt::Debug for FanOutWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutWriter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanOutWriter {
    pub fn new(sinks: Vec<Arc<dyn RecordWriter>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn RecordWriter>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RecordWriter for FanOutWriter {
    /// A failing sink does not stop the others; the first error is returned.
    fn write_record(&self, record: &[u8]) -> io::Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.write_record(record) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
