//! Request correlation, structured logging and panic recovery for axum
//! services.
//!
//! - [`log`]: handler-based structured logging with JSON, text and dev
//!   encoders, stderr and size-rotated file sinks, request-ID injection and a
//!   `tracing` bridge.
//! - [`middleware`]: per-request correlation ID, timing and access log; panic
//!   recovery that tells client disconnects apart from application panics.
//! - [`context`]: the request-scoped store both of them share.
//! - [`task`]: background tasks whose panics are logged and reported.
//!
//! ```rust,ignore
//! let cfg = httpkit::config::LoggerConfig::default();
//! httpkit::log::factory::init(&cfg)?;
//!
//! let app = Router::new()
//!     .route("/hello", get(hello))
//!     .layer(from_fn_with_state(Recovery::default(), recovery_middleware))
//!     .layer(from_fn_with_state(
//!         RequestLifecycle::new(&cfg.request_id_key)?,
//!         request_lifecycle_middleware,
//!     ));
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod log;
pub mod middleware;
pub mod task;
pub mod timing;

#[cfg(test)]
mod test_support;

pub use config::{Config, LoggerConfig};
pub use context::RequestContext;
pub use error::{AppError, Error, Result};
pub use log::Logger;
pub use task::spawn_recovered;
pub use timing::ExecutionTimer;
