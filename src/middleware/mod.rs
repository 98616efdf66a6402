//! Axum middleware: request lifecycle (correlation ID, timing, access log)
//! and panic recovery, plus the liveness endpoint.
//!
//! Layer recovery inside lifecycle:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/hello", get(hello))
//!     .layer(from_fn_with_state(Recovery::default(), recovery_middleware))
//!     .layer(from_fn_with_state(RequestLifecycle::default(), request_lifecycle_middleware));
//! ```

pub mod health;
pub mod lifecycle;
pub mod recovery;
pub mod request_id;

pub use lifecycle::{level_for_status, request_lifecycle_middleware, RequestLifecycle, SkipFn};
pub use recovery::{
    internal_error, is_transport_disconnect, recovery_middleware, sanitize_request_headers,
    ErrorHandler, PanicError, RecordedError, RecoveredPanic, Recovery,
};
pub use request_id::{generate_request_id, RequestId};
