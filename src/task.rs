//! Background tasks that report their panics instead of vanishing.
//!
//! ```rust,ignore
//! let failures = Arc::clone(&state.refresh_failures);
//! spawn_recovered(refresh_cache(pool), move |_payload| {
//!     failures.fetch_add(1, Ordering::Relaxed);
//! });
//! ```

use std::{any::Any, future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt as _;
use tokio::task::JoinHandle;

use crate::{
    context::RequestContext,
    log::{default_logger, Attr, Logger, Value},
    middleware::recovery::panic_error_value,
};

/// The value a task panicked with.
pub type PanicPayload = Box<dyn Any + Send>;

/// Spawn `fut` on the tokio runtime. If it panics, the panic is logged through
/// the process default logger and its payload handed to `on_error`.
pub fn spawn_recovered<F, E>(fut: F, on_error: E) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    E: FnOnce(PanicPayload) + Send + 'static,
{
    spawn_recovered_with(default_logger(), fut, on_error)
}

/// [`spawn_recovered`] logging through `logger`.
///
/// The ambient request context of the caller travels with the task, so its
/// records keep the request ID.
pub fn spawn_recovered_with<F, E>(logger: Logger, fut: F, on_error: E) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    E: FnOnce(PanicPayload) + Send + 'static,
{
    let ctx = RequestContext::current();
    let log_ctx = ctx.clone();
    let task = async move {
        let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await else {
            return;
        };
        logger.error(
            log_ctx.as_deref(),
            "background task panicked",
            vec![Attr::new("err", Value::Error(panic_error_value(payload.as_ref())))],
        );
        on_error(payload);
    };

    match ctx {
        Some(ctx) => tokio::spawn(RequestContext::scope(ctx, task)),
        None => tokio::spawn(task),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        config::LoggerConfig, log::factory::build_with_writer,
        middleware::recovery::panic_message, test_support::MemoryWriter,
    };

    fn capture() -> (Logger, MemoryWriter) {
        let writer = MemoryWriter::new();
        (
            build_with_writer(&LoggerConfig::default(), Arc::new(writer.clone())),
            writer,
        )
    }

    async fn crash() {
        panic!("worker died")
    }

    #[tokio::test]
    async fn panic_is_logged_and_handed_to_the_callback() {
        let (logger, writer) = capture();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = spawn_recovered_with(logger, crash(), move |payload| {
            let _ = tx.send(panic_message(payload.as_ref()));
        });

        handle.await.expect("task is not reported as panicked");
        assert_eq!(rx.await.unwrap(), "worker died");
        let line = &writer.json_lines()[0];
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["msg"], "background task panicked");
        assert_eq!(line["err"], "worker died");
    }

    #[tokio::test]
    async fn clean_exit_is_silent() {
        let (logger, writer) = capture();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        spawn_recovered_with(logger, async {}, move |_| flag.store(true, Ordering::SeqCst))
            .await
            .unwrap();

        assert!(!called.load(Ordering::SeqCst));
        assert!(writer.contents().is_empty());
    }

    #[tokio::test]
    async fn panic_log_keeps_the_spawning_request_id() {
        let (logger, writer) = capture();
        let ctx = Arc::new(RequestContext::new());
        ctx.set_correlation_id("X-Request-ID", "bg-7".to_string());

        RequestContext::scope(ctx, async {
            spawn_recovered_with(logger, crash(), |_| {}).await.unwrap();
        })
        .await;

        assert_eq!(writer.json_lines()[0]["request_id"], "bg-7");
    }
}
