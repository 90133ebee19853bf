//! Panic recovery.
//!
//! A panic anywhere below this guard (including one forwarded by the timeout
//! guard from the handler task) is turned into a 500 envelope with the
//! message `panic: <value>`. The process and concurrent requests are
//! unaffected.
//!
//! The process panic hook captures location and backtrace at the panic
//! site. Inside a [`catch_panic`] scope it hands them to the catching guard
//! through a thread-local, so the guard can log the fault, the request and
//! the trace as one error event. Outside any scope the hook logs the panic
//! itself and defers to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::sync::Once;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;

use crate::http::envelope::{error_response, OpaqueError};
use crate::observability::{metrics, LogSink};

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

/// A caught panic: its value plus, when the hook saw it, where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: Option<String>,
}

impl PanicReport {
    /// Build the report for a payload caught on this thread.
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<PanicReport>() {
            Ok(report) => return *report,
            Err(payload) => payload,
        };
        let message = panic_message(payload.as_ref());
        match LAST_PANIC.with(|slot| slot.borrow_mut().take()) {
            Some(captured) => PanicReport {
                message,
                ..captured
            },
            None => PanicReport {
                message,
                location: None,
                backtrace: None,
            },
        }
    }
}

/// Marks the current thread as being inside a catching guard while alive.
struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        GuardScope
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Poll `future`, turning a panic into a [`PanicReport`].
pub async fn catch_panic<F: Future>(future: F) -> Result<F::Output, PanicReport> {
    let mut future = Box::pin(future);
    let scoped = std::future::poll_fn(move |cx| {
        let _scope = GuardScope::enter();
        future.as_mut().poll(cx)
    });
    AssertUnwindSafe(scoped)
        .catch_unwind()
        .await
        .map_err(PanicReport::from_payload)
}

/// Middleware catching handler panics.
pub async fn recovery_middleware(
    State(sink): State<LogSink>,
    request: Request<Body>,
    next: Next,
) -> Response {
    install_panic_hook();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match catch_panic(next.run(request)).await {
        Ok(response) => response,
        Err(report) => {
            tracing::error!(
                method = %method,
                path = %path,
                error = %report.message,
                location = report.location.as_deref().unwrap_or("<unknown>"),
                backtrace = report.backtrace.as_deref().unwrap_or("<unavailable>"),
                "panic: recovered in request handler"
            );
            metrics::record_panic();
            sink.flush();

            error_response(
                &OpaqueError::new(format!("panic: {}", report.message)),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// Render a panic payload the way `std` does.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Install the process panic hook. Safe to call repeatedly; only the first
/// call installs.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let report = capture(info);
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
                return;
            }
            let report = capture(info);
            tracing::error!(
                error = %report.message,
                location = report.location.as_deref().unwrap_or("<unknown>"),
                backtrace = report.backtrace.as_deref().unwrap_or("<unavailable>"),
                "panic"
            );
            previous(info);
        }));
    });
}

fn capture(info: &PanicHookInfo<'_>) -> PanicReport {
    PanicReport {
        message: panic_message(info.payload()),
        location: info.location().map(ToString::to_string),
        backtrace: Some(Backtrace::force_capture().to_string()),
    }
}
