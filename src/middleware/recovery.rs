//! Panic recovery.
//!
//! The downstream future is polled under `catch_unwind`. A recovered panic is
//! always logged at error level with the method, URL and a header dump in
//! which `Authorization` is masked. What happens next depends on the payload:
//!
//! - **Transport disconnect** (broken pipe / connection reset anywhere in the
//!   payload's error chain): nobody is listening any more, so the caller's
//!   handler is skipped and a bodyless 499 carrying a [`RecordedError`] is
//!   returned for the outer layers to log.
//! - **Anything else**: the caller's [`ErrorHandler`] builds the response.
//!
//! Place this layer inside the lifecycle layer so the access log sees the
//! final status and the request ID is already resolved.

use std::{
    any::Any,
    error::Error as StdError,
    io,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, Version},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt as _;

use crate::{
    context::RequestContext,
    error::AppError,
    log::{default_logger, Attr, ErrorValue, Logger, Value},
};

/// Status returned when the client went away mid-request.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const REDACTED: &str = "*";

/// Builds the client-facing response for an application panic.
pub type ErrorHandler = Arc<dyn Fn(RecoveredPanic) -> Response + Send + Sync>;

/// Error text attached to a response for the access log (`errorMessage`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError(pub String);

/// A non-error panic payload, normalised to an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PanicError(pub String);

/// What the [`ErrorHandler`] gets to work with.
pub struct RecoveredPanic {
    pub method: Method,
    pub uri: Uri,
    /// The raw value passed to `panic!` / `panic_any`.
    pub payload: Box<dyn Any + Send>,
}

impl std::fmt::Debug for RecoveredPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveredPanic")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("payload", &self.message())
            .finish()
    }
}

impl RecoveredPanic {
    /// Text of the payload.
    pub fn message(&self) -> String {
        panic_message(self.payload.as_ref())
    }

    pub fn is_transport_disconnect(&self) -> bool {
        payload_error(self.payload.as_ref()).is_some_and(is_transport_disconnect)
    }
}

/// State for [`recovery_middleware`].
#[derive(Clone)]
pub struct Recovery {
    handler: ErrorHandler,
    logger: Option<Logger>,
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery")
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new(internal_error)
    }
}

impl Recovery {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(RecoveredPanic) -> Response + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            logger: None,
        }
    }

    /// Log through `logger` instead of the process default.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    fn recover(
        &self,
        request: RequestSnapshot,
        ctx: Option<Arc<RequestContext>>,
        payload: Box<dyn Any + Send>,
    ) -> Response {
        let message = panic_message(payload.as_ref());
        let error = panic_error_value(payload.as_ref());
        let disconnect = payload_error(payload.as_ref()).is_some_and(is_transport_disconnect);

        let logger = self.logger.clone().unwrap_or_else(default_logger);
        logger.error(
            ctx.as_deref(),
            "internal server error",
            vec![
                Attr::new("err", Value::Error(error)),
                Attr::string("method", request.method.as_str()),
                Attr::string("url", request.uri.to_string()),
                Attr::string("headers", request.sanitized_headers()),
            ],
        );

        if disconnect {
            let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST);
            let mut response = status.into_response();
            response.extensions_mut().insert(RecordedError(message));
            return response;
        }

        let recovered = RecoveredPanic {
            method: request.method,
            uri: request.uri,
            payload,
        };
        let handler = Arc::clone(&self.handler);
        let mut response = std::panic::catch_unwind(AssertUnwindSafe(move || handler(recovered)))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        // The panic text replaces whatever the handler's response recorded.
        response.extensions_mut().insert(RecordedError(message));
        response
    }
}

/// Axum middleware that turns panics in downstream handlers into responses.
pub async fn recovery_middleware(
    State(recovery): State<Recovery>,
    req: Request,
    next: Next,
) -> Response {
    let snapshot = RequestSnapshot::of(&req);
    let ctx = req
        .extensions()
        .get::<Arc<RequestContext>>()
        .cloned()
        .or_else(RequestContext::current);

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => recovery.recover(snapshot, ctx, payload),
    }
}

/// Stock [`ErrorHandler`]: a 500 JSON body through [`AppError`].
pub fn internal_error(_panic: RecoveredPanic) -> Response {
    AppError::from(anyhow::anyhow!("internal server error")).into_response()
}

/// Whether `err` or any of its sources is a broken pipe or connection reset.
///
/// Matches on the I/O error kind, and on the message text for errors that
/// only carry it as a string. The text match is a heuristic: OS and locale
/// decide the wording.
pub fn is_transport_disconnect(err: &(dyn StdError + 'static)) -> bool {
    std::iter::successors(Some(err), |&e| e.source()).any(|e| {
        let Some(io_err) = e.downcast_ref::<io::Error>() else {
            return false;
        };
        if matches!(io_err.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
            return true;
        }
        let text = io_err.to_string().to_lowercase();
        text.contains("broken pipe") || text.contains("connection reset by peer")
    })
}

/// Dump of the request line and headers, `Authorization` masked.
///
/// Header names are rendered in canonical form (`X-Request-Id`); values that
/// are not UTF-8 are converted lossily.
pub fn sanitize_request_headers<B>(req: &axum::http::Request<B>) -> String {
    dump_headers(req.method(), req.uri(), req.version(), req.headers())
}

struct RequestSnapshot {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RequestSnapshot {
    fn of(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }

    fn sanitized_headers(&self) -> String {
        dump_headers(&self.method, &self.uri, self.version, &self.headers)
    }
}

fn dump_headers(method: &Method, uri: &Uri, version: Version, headers: &HeaderMap) -> String {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut lines = vec![format!("{method} {target} {version:?}")];
    for (name, value) in headers {
        let name = canonical_header_name(name.as_str());
        if name.eq_ignore_ascii_case("authorization") {
            lines.push(format!("{name}: {REDACTED}"));
        } else {
            lines.push(format!("{name}: {}", String::from_utf8_lossy(value.as_bytes())));
        }
    }
    lines.join("\r\n")
}

fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// The payload as a loggable error value.
pub(crate) fn panic_error_value(payload: &(dyn Any + Send)) -> ErrorValue {
    match payload_error(payload) {
        Some(err) => ErrorValue::from_dyn(err),
        None => ErrorValue::new(&PanicError(panic_message(payload))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_owned();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    match payload_error(payload) {
        Some(err) => err.to_string(),
        None => "non-string panic payload".to_owned(),
    }
}

/// The payload as an error, for the payload types that carry one.
fn payload_error(payload: &(dyn Any + Send)) -> Option<&(dyn StdError + 'static)> {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        return Some(err);
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        return Some(err.as_ref());
    }
    if let Some(err) = payload.downcast_ref::<anyhow::Error>() {
        let err: &(dyn StdError + Send + Sync + 'static) = err.as_ref();
        return Some(err);
    }
    None
}
