//! Request lifecycle: correlation ID, timing and the access log.
//!
//! Per request, in order:
//!
//! 1. Read or create the request's [`RequestContext`] and its start time.
//! 2. Resolve the correlation ID from the configured header, generating one if
//!    absent, and store it in the context, the request headers and a
//!    [`RequestId`] extension.
//! 3. Consult the skip predicate; skipped requests get steps 4 and 6 only.
//! 4. Run the downstream handler with the context as ambient request scope.
//! 5. Emit one `HTTP request` record; severity follows the status class.
//! 6. Echo the ID on the response.
//!
//! ```rust,ignore
//! let lifecycle = RequestLifecycle::new("X-Request-ID")?
//!     .skip(|req| req.uri().path() == "/healthz");
//! let app = Router::new()
//!     .route("/hello", get(hello))
//!     .layer(axum::middleware::from_fn_with_state(lifecycle, request_lifecycle_middleware));
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{
    context::{correlation_key, RequestContext},
    error::{Error, Result},
    log::{default_logger, Attr, Level, Logger},
};

use super::{
    recovery::RecordedError,
    request_id::{generate_request_id, inbound_request_id, RequestId},
};

const DEFAULT_HEADER: &str = "X-Request-ID";
const ACCESS_LOG_MESSAGE: &str = "HTTP request";
const REDACTED: &str = "*";
const SENSITIVE_QUERY_KEYS: &[&str] = &["password", "passwd", "token", "access_token", "secret", "api_key"];

/// Predicate deciding whether a request is left out of the access log.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// State for [`request_lifecycle_middleware`].
#[derive(Clone)]
pub struct RequestLifecycle {
    header: HeaderName,
    /// Context key of the correlation ID; the lowercased header name.
    key: Arc<str>,
    skip: Option<SkipFn>,
    logger: Option<Logger>,
}

impl std::fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("header", &self.header)
            .field("key", &self.key)
            .field("skip", &self.skip.is_some())
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static("x-request-id"),
            key: Arc::from(correlation_key(DEFAULT_HEADER)),
            skip: None,
            logger: None,
        }
    }
}

impl RequestLifecycle {
    /// Use `header` for the inbound/outbound ID. The header name is also the
    /// context key, so pair it with a
    /// [`LoggerConfig::request_id_key`](crate::config::LoggerConfig::request_id_key)
    /// naming the same header; case does not matter.
    pub fn new(header: &str) -> Result<Self> {
        let name = HeaderName::try_from(header)
            .map_err(|_| Error::InvalidHeaderName(header.to_owned()))?;
        Ok(Self {
            key: Arc::from(name.as_str()),
            header: name,
            ..Self::default()
        })
    }

    pub fn skip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Log through `logger` instead of the process default.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn context_key(&self) -> &str {
        &self.key
    }
}

/// Axum middleware implementing the request lifecycle.
pub async fn request_lifecycle_middleware(
    State(lifecycle): State<RequestLifecycle>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::from_extensions(req.extensions_mut());
    let started = ctx.start_time();

    let id = match inbound_request_id(req.headers(), &lifecycle.header) {
        Some(id) => id,
        None => {
            let id = generate_request_id();
            if let Ok(value) = HeaderValue::from_str(&id) {
                req.headers_mut().insert(lifecycle.header.clone(), value);
            }
            id
        }
    };
    let id = ctx.set_correlation_id(&lifecycle.key, id);
    req.extensions_mut().insert(RequestId(id.clone()));

    let skipped = lifecycle.skip.as_ref().is_some_and(|skip| skip(&req));
    let access = (!skipped).then(|| AccessEntry::from_request(&req));

    let mut response = RequestContext::scope(Arc::clone(&ctx), next.run(req)).await;

    if let Some(access) = access {
        let elapsed = started.elapsed();
        let status = response.status();
        let error = response.extensions().get::<RecordedError>();
        let attrs = access.into_attrs(status, elapsed, error);
        let logger = lifecycle.logger.clone().unwrap_or_else(default_logger);
        logger.log(Some(&ctx), level_for_status(status), ACCESS_LOG_MESSAGE, attrs);
    }

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(lifecycle.header, value);
    }
    response
}

/// Access-log severity: 5xx → error, 4xx → warn, anything else → info.
pub fn level_for_status(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::Error
    } else if status.is_client_error() {
        Level::Warn
    } else {
        Level::Info
    }
}

/// What the access log needs from the request, captured before it is moved
/// into the handler.
struct AccessEntry {
    method: String,
    path: String,
    query: String,
    full_path: String,
    ip: String,
    endpoint: Option<String>,
}

impl AccessEntry {
    fn from_request(req: &Request) -> Self {
        let path = req.uri().path().to_owned();
        let pairs = redacted_query(req.uri().query().unwrap_or_default());
        let full_path = if pairs.is_empty() {
            path.clone()
        } else {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish();
            format!("{path}?{encoded}")
        };

        Self {
            method: req.method().to_string(),
            query: query_json(&pairs),
            full_path,
            path,
            ip: client_ip(req),
            endpoint: req
                .extensions()
                .get::<MatchedPath>()
                .map(|m| m.as_str().to_owned()),
        }
    }

    fn into_attrs(self, status: StatusCode, elapsed: Duration, error: Option<&RecordedError>) -> Vec<Attr> {
        let summary = format!(
            "{:3} {:?} {} {} {}",
            status.as_u16(),
            elapsed,
            self.ip,
            self.method,
            self.full_path
        );

        let mut attrs = vec![
            Attr::string("summary", summary),
            Attr::int("status", i64::from(status.as_u16())),
            Attr::string("duration", format!("{elapsed:?}")),
            Attr::string("ip", self.ip),
            Attr::string("method", self.method),
            Attr::string("path", self.path),
            Attr::string("query", self.query),
            Attr::string("fullPath", self.full_path),
            Attr::group(
                "requestDuration",
                vec![
                    Attr::int("millis", i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)),
                    Attr::float("seconds", elapsed.as_secs_f64()),
                ],
            ),
        ];
        if let Some(err) = error.filter(|e| !e.0.is_empty()) {
            attrs.push(Attr::string("errorMessage", err.0.clone()));
        }
        if let Some(endpoint) = self.endpoint {
            attrs.push(Attr::string("endpoint", endpoint));
        }
        attrs
    }
}

/// Decoded query pairs with sensitive values replaced.
fn redacted_query(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(key, value)| {
            let value = if is_sensitive(&key) {
                REDACTED.to_owned()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect()
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_QUERY_KEYS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
}

/// `{"key": ["v1", "v2"]}`, keys in first-seen order.
fn query_json(pairs: &[(String, String)]) -> String {
    let mut object = serde_json::Map::new();
    for (key, value) in pairs {
        let entry = object
            .entry(key.clone())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(values) = entry {
            values.push(serde_json::Value::String(value.clone()));
        }
    }
    serde_json::Value::Object(object).to_string()
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
fn client_ip(req: &Request) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    if let Some(first) = header("x-forwarded-for")
        .as_deref()
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_owned();
    }
    if let Some(real) = header("x-real-ip").map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
        return real;
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}
