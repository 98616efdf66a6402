//! Error types.
//!
//! [`Error`] covers the failures this crate can report itself: a logging
//! destination that cannot be prepared, a tracing subscriber that cannot be
//! installed, or a header name that is not a valid HTTP token. Failing to
//! prepare the log destination is a startup condition; binaries are expected
//! to propagate it out of `main` rather than keep running half-configured.
//!
//! [`AppError`] wraps [`anyhow::Error`] and converts it into an HTTP 500
//! response via [`IntoResponse`], so handlers can return `Result<T, AppError>`
//! and propagate with `?`.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::middleware::recovery::RecordedError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while assembling the logging pipeline or middleware.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The parent directory of the configured log file could not be created.
    #[error("failed to create log directory {}", path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log file itself could not be opened for appending.
    #[error("failed to open log file {}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another global tracing subscriber was installed first.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall(#[source] tracing_subscriber::util::TryInitError),

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),
}

/// Wraps [`anyhow::Error`] so it can be returned from axum handlers.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        tracing::warn!(error = %message, "handler error");
        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message.as_str() })),
        )
            .into_response();
        response.extensions_mut().insert(RecordedError(message));
        response
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::error::Error as _;

    #[tokio::test]
    async fn into_response_returns_500_with_json_error_body() {
        let err: AppError = anyhow::anyhow!("something went wrong").into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<RecordedError>(),
            Some(&RecordedError("something went wrong".into()))
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "something went wrong");
    }

    #[tokio::test]
    async fn crate_error_converts_into_app_error() {
        let err: AppError = Error::InvalidHeaderName("bad header".into()).into();
        let response = err.into_response();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid header name `bad header`");
    }

    #[test]
    fn log_dir_error_names_the_path_and_keeps_its_source() {
        let err = Error::LogDir {
            path: PathBuf::from("/var/log/app"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to create log directory /var/log/app");
        assert!(err.source().is_some());
    }

    #[test]
    fn debug_format_includes_inner_error_message() {
        let err: AppError = anyhow::anyhow!("debug me").into();
        let s = format!("{err:?}");
        assert!(s.contains("debug me"), "debug output: {s}");
    }
}
