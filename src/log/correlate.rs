//! Request-ID injection.

use std::{io, sync::Arc};

use crate::context::RequestContext;

use super::{
    handler::LogHandler,
    record::{Attr, Level, Record},
};

/// Attribute name the correlation ID is written under.
pub const REQUEST_ID_ATTR: &str = "request_id";

/// Wraps another handler and adds `request_id` to every record emitted while
/// the request context holds a correlation ID under `request_id_key`.
///
/// The key is compared like a header name, ignoring ASCII case.
#[derive(Clone)]
pub struct CorrelatingHandler {
    inner: Arc<dyn LogHandler>,
    request_id_key: Arc<str>,
}

impl CorrelatingHandler {
    pub fn new(inner: Arc<dyn LogHandler>, request_id_key: impl Into<Arc<str>>) -> Self {
        Self {
            inner,
            request_id_key: request_id_key.into(),
        }
    }

    pub fn request_id_key(&self) -> &str {
        &self.request_id_key
    }
}

impl LogHandler for CorrelatingHandler {
    fn enabled(&self, ctx: Option<&RequestContext>, level: Level) -> bool {
        self.inner.enabled(ctx, level)
    }

    fn handle(&self, ctx: Option<&RequestContext>, mut record: Record) -> io::Result<()> {
        if let Some(id) = ctx.and_then(|c| c.correlation_id(&self.request_id_key)) {
            record.add_attr(Attr::string(REQUEST_ID_ATTR, id));
        }
        self.inner.handle(ctx, record)
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            inner: self.inner.with_attrs(attrs),
            request_id_key: Arc::clone(&self.request_id_key),
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogHandler> {
        Arc::new(Self {
            inner: self.inner.with_group(name),
            request_id_key: Arc::clone(&self.request_id_key),
        })
    }
}
