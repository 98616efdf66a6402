//! Per-request state shared by the middleware and the logging pipeline.
//!
//! A [`RequestContext`] lives exactly as long as one inbound request. The
//! lifecycle middleware creates it on first access, stores it in the request
//! extensions and runs the downstream handler inside [`RequestContext::scope`]
//! so that log records emitted anywhere in that task can find the request's
//! correlation ID without it being threaded through every call.
//!
//! Every entry is write-once: the first writer wins and later writers get the
//! stored value back.

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use axum::http::Extensions;

/// Key under which the request start time is stored.
pub const START_TIME_KEY: &str = "startTime";

/// Normalised form of a correlation-ID key: the ASCII-lowercased header name.
pub fn correlation_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Request-scoped, write-once key-value store.
#[derive(Default)]
pub struct RequestContext {
    entries: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("RequestContext").field("keys", &keys).finish()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the context stored in `extensions`, creating it on first access.
    pub fn from_extensions(extensions: &mut Extensions) -> Arc<Self> {
        if let Some(existing) = extensions.get::<Arc<Self>>() {
            return Arc::clone(existing);
        }
        let context = Arc::new(Self::new());
        extensions.insert(Arc::clone(&context));
        context
    }

    /// Look up `key`, returning `None` if it is absent or holds another type.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key)?.downcast_ref::<T>().cloned()
    }

    /// Return the value stored under `key`, inserting `init()` if there is none.
    ///
    /// If the key already holds a value of a different type the existing entry
    /// is left untouched and the freshly built value is returned unsaved.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        if let Some(found) = self.get::<T>(key) {
            return found;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(existing) => match existing.downcast_ref::<T>() {
                Some(found) => found.clone(),
                None => init(),
            },
            None => {
                let value = init();
                entries.insert(key.to_owned(), Arc::new(value.clone()));
                value
            }
        }
    }

    /// Store `value` under `key` unless something is already there.
    ///
    /// Returns the value that is stored after the call.
    pub fn set_if_absent<T>(&self, key: &str, value: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_or_insert_with(key, move || value)
    }

    /// Instant the request started, recorded on first access.
    pub fn start_time(&self) -> Instant {
        self.start_time_with_key(START_TIME_KEY)
    }

    pub fn start_time_with_key(&self, key: &str) -> Instant {
        self.get_or_insert_with(key, Instant::now)
    }

    /// Store the request's correlation ID under `key` unless one is already
    /// there. Returns the stored ID.
    ///
    /// `key` is matched like an HTTP header name, so `X-Request-ID` and
    /// `x-request-id` address the same entry.
    pub fn set_correlation_id(&self, key: &str, id: String) -> String {
        self.set_if_absent(&correlation_key(key), id)
    }

    /// Correlation ID stored under `key`, if the request has one.
    pub fn correlation_id(&self, key: &str) -> Option<String> {
        self.get::<String>(&correlation_key(key))
    }

    /// Run `fut` with `context` as the ambient request context.
    pub async fn scope<F>(context: Arc<Self>, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(context, fut).await
    }

    /// Synchronous counterpart of [`scope`][Self::scope].
    pub fn sync_scope<R>(context: Arc<Self>, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(context, f)
    }

    /// The ambient context of the running task, if any.
    pub fn current() -> Option<Arc<Self>> {
        CURRENT.try_with(Arc::clone).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_time_is_recorded_once() {
        let ctx = RequestContext::new();
        let first = ctx.start_time();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ctx.start_time();
        assert_eq!(first, second);
    }

    #[test]
    fn custom_start_time_keys_are_independent() {
        let ctx = RequestContext::new();
        let default = ctx.start_time();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let custom = ctx.start_time_with_key("handlerStart");
        assert!(custom > default);
        assert_eq!(ctx.start_time_with_key("handlerStart"), custom);
    }

    #[test]
    fn first_writer_wins() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.set_if_absent("tenant", "abc".to_string()), "abc");
        assert_eq!(ctx.set_if_absent("tenant", "def".to_string()), "abc");
        assert_eq!(ctx.get::<String>("tenant").as_deref(), Some("abc"));
    }

    #[test]
    fn correlation_keys_ignore_header_case() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.set_correlation_id("x-request-id", "abc".into()), "abc");
        assert_eq!(ctx.set_correlation_id("X-Request-ID", "def".into()), "abc");
        assert_eq!(ctx.correlation_id("X-REQUEST-ID").as_deref(), Some("abc"));
        assert_eq!(ctx.correlation_id("x-request-id").as_deref(), Some("abc"));
        assert!(ctx.correlation_id("X-Trace-ID").is_none());
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let ctx = RequestContext::new();
        ctx.set_if_absent("count", 7_u32);
        assert_eq!(ctx.get::<u32>("count"), Some(7));
        assert!(ctx.get::<String>("count").is_none());
        assert!(ctx.get::<u32>("missing").is_none());
    }

    #[test]
    fn mismatched_type_does_not_overwrite() {
        let ctx = RequestContext::new();
        ctx.set_if_absent("key", 1_u8);
        assert_eq!(ctx.set_if_absent("key", "text".to_string()), "text");
        assert_eq!(ctx.get::<u8>("key"), Some(1));
    }

    #[test]
    fn from_extensions_creates_once() {
        let mut extensions = Extensions::new();
        let first = RequestContext::from_extensions(&mut extensions);
        let second = RequestContext::from_extensions(&mut extensions);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn scope_exposes_the_context() {
        let ctx = Arc::new(RequestContext::new());
        ctx.set_correlation_id("X-Request-ID", "req-42".to_string());

        let seen = RequestContext::scope(Arc::clone(&ctx), async {
            RequestContext::current().and_then(|c| c.correlation_id("X-Request-ID"))
        })
        .await;

        assert_eq!(seen.as_deref(), Some("req-42"));
        assert!(RequestContext::current().is_none());
    }

    #[test]
    fn sync_scope_exposes_the_context() {
        let ctx = Arc::new(RequestContext::new());
        let inside = RequestContext::sync_scope(Arc::clone(&ctx), || {
            RequestContext::current().is_some_and(|c| Arc::ptr_eq(&c, &ctx))
        });
        assert!(inside);
    }
}
