//! Liveness endpoint for the demo server, reporting how logging is set up.

use std::time::Instant;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::config::{LoggerConfig, OutputType};
use crate::log::Level;

/// Snapshot of the logger configuration taken at startup.
#[derive(Debug, Clone)]
pub struct HealthInfo {
    started: Instant,
    level: Level,
    output: OutputType,
    file_sink: bool,
}

impl HealthInfo {
    pub fn new(cfg: &LoggerConfig) -> Self {
        Self {
            started: Instant::now(),
            level: cfg.level,
            output: cfg.output_type,
            file_sink: cfg.file_path().is_some(),
        }
    }
}

/// `GET /healthz`: 200 with uptime and the active log level, encoder and sinks.
pub async fn healthz(State(info): State<HealthInfo>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": info.started.elapsed().as_secs(),
        "log": {
            "level": info.level.as_str(),
            "output": info.output,
            "file": info.file_sink,
        },
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::{body::to_bytes, http::StatusCode, routing::get, Router};
    use tower::ServiceExt as _;

    use super::*;

    #[tokio::test]
    async fn healthz_reports_the_logging_setup() {
        let cfg = LoggerConfig {
            level: Level::Debug,
            output_type: OutputType::Dev,
            log_path: Some(PathBuf::from("/tmp/app.log")),
            ..LoggerConfig::default()
        };
        let app = Router::new()
            .route("/healthz", get(healthz))
            .with_state(HealthInfo::new(&cfg));

        let response = app
            .oneshot(
                axum::http::Request::get("/healthz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["log"]["level"], "DEBUG");
        assert_eq!(json["log"]["output"], "dev");
        assert_eq!(json["log"]["file"], true);
        assert!(json["uptime_secs"].is_u64());
    }
}
