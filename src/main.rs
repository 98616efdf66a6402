use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use axum::{
    extract::Query,
    middleware::from_fn_with_state,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use httpkit::{
    log::factory,
    middleware::{
        health::{healthz, HealthInfo}, recovery_middleware, request_lifecycle_middleware, Recovery,
        RequestId, RequestLifecycle,
    },
    AppError, Config, ExecutionTimer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("HTTPKIT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // A logging path that cannot be prepared is fatal.
    factory::init(&config.log).context("initialising logger")?;

    info!(
        port = config.server.port,
        request_id_header = %config.server.request_id_header,
        "httpkit-demo starting"
    );

    let lifecycle = RequestLifecycle::new(&config.server.request_id_header)?
        .skip(|req| req.uri().path() == "/healthz");

    let app = Router::new()
        .route("/healthz", get(healthz).with_state(HealthInfo::new(&config.log)))
        .route("/hello", get(hello))
        .route("/fail", get(fail))
        .route("/panic", get(panics))
        .layer(TimeoutLayer::new(Duration::from_millis(
            config.server.request_timeout_ms,
        )))
        .layer(from_fn_with_state(Recovery::default(), recovery_middleware))
        .layer(from_fn_with_state(lifecycle, request_lifecycle_middleware));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct HelloParams {
    name: Option<String>,
}

/// `GET /hello?name=..` — greets, timing the work.
async fn hello(
    Extension(id): Extension<RequestId>,
    Query(params): Query<HelloParams>,
) -> Json<serde_json::Value> {
    let logger = httpkit::log::default_logger();
    let timer = ExecutionTimer::start(&logger, "greeting", vec![]);
    let name = params.name.unwrap_or_else(|| "world".into());
    tokio::time::sleep(Duration::from_millis(5)).await;
    timer.finish(vec![]);

    info!(name = %name, "greeted");
    Json(json!({ "message": format!("hello, {name}"), "request_id": id.0 }))
}

/// `GET /fail` — an ordinary handler error.
async fn fail() -> Result<Json<serde_json::Value>, AppError> {
    let content = std::fs::read_to_string("/definitely/not/here")
        .context("reading demo fixture")?;
    Ok(Json(json!({ "content": content })))
}

/// `GET /panic` — exercises the recovery middleware.
async fn panics() -> &'static str {
    panic!("demo panic")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
