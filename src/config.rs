//! Configuration types for httpkit.
//!
//! [`LoggerConfig`] is what [`crate::log::factory`] consumes. The demo binary
//! wraps it in a [`Config`] loaded once at startup from a TOML file and
//! validated before the server opens any ports.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//! request_id_header = "X-Request-ID"
//!
//! [log]
//! level       = "debug"
//! output_type = "dev"
//! log_path    = "logs/app.log"
//! console     = true
//! error_stack = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::http::HeaderName;
use serde::{Deserialize, Deserializer, Serialize};

use crate::log::Level;

/// Output encoding of the assembled logger.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// One JSON object per line.
    #[default]
    Json,
    /// `key=value` pairs.
    Text,
    /// Multi-line human-oriented rendering for local development.
    Dev,
}

impl OutputType {
    /// Unrecognised names fall back to JSON.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "dev" => Self::Dev,
            _ => Self::Json,
        }
    }
}

impl<'de> Deserialize<'de> for OutputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

/// Declarative logger configuration. Immutable once the logger is built.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Minimum severity to emit.
    #[serde(default)]
    pub level: Level,

    /// Include call-site information under `source`.
    #[serde(default)]
    pub add_source: bool,

    #[serde(default)]
    pub output_type: OutputType,

    /// File destination. Parent directories are created on build.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Rotate once the file would grow past this many megabytes.
    #[serde(default = "defaults::max_size_mb")]
    pub max_size_mb: u64,

    /// Rotated files to keep; 0 keeps all of them.
    #[serde(default)]
    pub max_backups: usize,

    /// Days to keep rotated files; 0 disables age-based removal.
    #[serde(default)]
    pub max_age_days: u64,

    /// Gzip rotated files.
    #[serde(default)]
    pub compress: bool,

    /// Also write to standard error when `log_path` is set.
    #[serde(default)]
    pub console: bool,

    /// Context key (and header name) holding the correlation ID.
    #[serde(default = "defaults::request_id_key")]
    pub request_id_key: String,

    /// Expand `err`/`error` attributes into `{msg, type, stack}` groups.
    #[serde(default)]
    pub error_stack: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            add_source: false,
            output_type: OutputType::Json,
            log_path: None,
            max_size_mb: defaults::max_size_mb(),
            max_backups: 0,
            max_age_days: 0,
            compress: false,
            console: false,
            request_id_key: defaults::request_id_key(),
            error_stack: false,
        }
    }
}

impl LoggerConfig {
    /// The configured file path, treating an empty string as unset.
    pub fn file_path(&self) -> Option<&Path> {
        self.log_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Listener settings for the demo server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Inbound/outbound correlation header.
    #[serde(default = "defaults::request_id_key")]
    pub request_id_header: String,

    /// Per-request timeout applied in front of every route.
    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            request_id_header: defaults::request_id_key(),
            request_timeout_ms: defaults::request_timeout_ms(),
        }
    }
}

/// Top-level demo configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LoggerConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        HeaderName::try_from(self.server.request_id_header.as_str()).with_context(|| {
            format!(
                "server.request_id_header `{}` is not a valid header name",
                self.server.request_id_header
            )
        })?;

        anyhow::ensure!(
            !self.log.request_id_key.is_empty(),
            "log.request_id_key must not be empty"
        );
        anyhow::ensure!(
            self.server
                .request_id_header
                .eq_ignore_ascii_case(&self.log.request_id_key),
            "server.request_id_header `{}` and log.request_id_key `{}` must name the same header",
            self.server.request_id_header,
            self.log.request_id_key
        );
        anyhow::ensure!(
            self.server.request_timeout_ms > 0,
            "server.request_timeout_ms must be greater than zero"
        );
        Ok(())
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn max_size_mb() -> u64 { 100 }
    pub fn request_id_key() -> String { "X-Request-ID".into() }
    pub fn request_timeout_ms() -> u64 { 30_000 }
}
