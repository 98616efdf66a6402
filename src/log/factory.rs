//! Assembles a [`Logger`] from a [`LoggerConfig`].
//!
//! ```text
//! sinks:    stderr (console, or no file configured) + rotating file (log_path)
//! encoder:  json | text | dev, with the Enricher as its attribute hook
//! wrapper:  CorrelatingHandler(request_id_key)
//! ```

use std::{
    io::{self, IsTerminal as _},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

use crate::{
    config::{LoggerConfig, OutputType},
    error::{Error, Result},
};

use super::{
    bridge::LogLayer,
    rotate::{self, RotatingFile, RotationPolicy},
    set_default, CorrelatingHandler, DevHandler, DevOptions, Enricher, FanOutWriter,
    HandlerOptions, JsonHandler, LockedWriter, LogHandler, Logger, RecordWriter, StderrWriter,
    TextHandler,
};

static BRIDGE_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Build a logger without touching any process-wide state.
///
/// Creates the parent directory of `log_path` when needed; failing to do so
/// is reported as [`Error::LogDir`].
pub fn build(cfg: &LoggerConfig) -> Result<Logger> {
    let mut sinks = FanOutWriter::default();

    // Standard error whenever nothing else would receive records.
    let to_stderr = cfg.console || cfg.file_path().is_none();
    if to_stderr {
        sinks.push(Arc::new(StderrWriter));
    }
    if let Some(path) = cfg.file_path() {
        sinks.push(Arc::new(open_file_sink(path, cfg)?));
    }

    let color = to_stderr && sinks.len() == 1 && io::stderr().is_terminal();
    Ok(assemble(cfg, Arc::new(sinks), color))
}

/// Build a logger that writes every record to `writer`.
pub fn build_with_writer(cfg: &LoggerConfig, writer: Arc<dyn RecordWriter>) -> Logger {
    assemble(cfg, writer, false)
}

/// [`build`], install the result as the process default and route `tracing`
/// events into it.
///
/// The tracing bridge is registered as the global subscriber on the first
/// call only; later calls just replace the default logger. `RUST_LOG`, when
/// set, filters events before they reach the bridge.
pub fn init(cfg: &LoggerConfig) -> Result<Logger> {
    let logger = build(cfg)?;
    set_default(logger.clone());

    if !BRIDGE_INSTALLED.swap(true, Ordering::SeqCst) {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().ok())
            .with(LogLayer::process_default())
            .try_init()
            .map_err(Error::SubscriberInstall)?;
    }
    Ok(logger)
}

fn open_file_sink(path: &Path, cfg: &LoggerConfig) -> Result<LockedWriter<RotatingFile>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| Error::LogDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let policy = RotationPolicy::from_config(
        cfg.max_size_mb,
        cfg.max_backups,
        cfg.max_age_days,
        cfg.compress,
    );
    let file = rotate::open(path, policy).map_err(|source| Error::LogFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LockedWriter::new(file))
}

fn assemble(cfg: &LoggerConfig, writer: Arc<dyn RecordWriter>, color: bool) -> Logger {
    let opts = HandlerOptions {
        level: cfg.level,
        add_source: cfg.add_source,
        replace_attr: Some(Arc::new(Enricher::new(cfg.error_stack))),
    };

    let encoder: Arc<dyn LogHandler> = match cfg.output_type {
        OutputType::Json => Arc::new(JsonHandler::new(writer, opts)),
        OutputType::Text => Arc::new(TextHandler::new(writer, opts)),
        OutputType::Dev => Arc::new(DevHandler::new(
            writer,
            opts,
            DevOptions {
                color,
                ..DevOptions::default()
            },
        )),
    };

    Logger::new(Arc::new(CorrelatingHandler::new(
        encoder,
        cfg.request_id_key.as_str(),
    )))
}
