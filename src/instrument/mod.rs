//! Instrumentation hooks: spans around runner phases and published events.
//!
//! Instrumenters are observers. Every call into one goes through
//! [`isolated`], so a panicking instrumenter is logged and skipped while the
//! run carries on.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

pub const LLM_CALL_SPAN: &str = "turnstile.llm_call";
pub const AUTHORIZE_SPAN: &str = "turnstile.authorize";
pub const TOOL_EXECUTION_SPAN: &str = "turnstile.tool_execution";
pub const PREFLIGHT_SPAN: &str = "turnstile.preflight";

pub const RUN_PAUSED_EVENT: &str = "turnstile.run_paused";
pub const RUN_COMPLETED_EVENT: &str = "turnstile.run_completed";
pub const TOOL_CALLS_IGNORED_EVENT: &str = "turnstile.tool_calls_ignored";

/// Receives spans and events from the runner.
///
/// All methods default to no-ops so implementations override only what they
/// record.
pub trait Instrumenter: Send + Sync {
    fn span_start(&self, _name: &str, _payload: &serde_json::Value) {}

    fn span_end(&self, _name: &str, _payload: &serde_json::Value, _elapsed: Duration, _ok: bool) {}

    fn publish(&self, _event: &str, _payload: &serde_json::Value) {}
}

/// Instrumenter that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumenter;

impl Instrumenter for NoopInstrumenter {}

/// Forwards spans and events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumenter;

impl Instrumenter for TracingInstrumenter {
    fn span_start(&self, name: &str, payload: &serde_json::Value) {
        tracing::debug!(span = name, payload = %payload, "span started");
    }

    fn span_end(&self, name: &str, payload: &serde_json::Value, elapsed: Duration, ok: bool) {
        tracing::debug!(
            span = name,
            payload = %payload,
            elapsed_ms = elapsed.as_millis() as u64,
            ok,
            "span finished"
        );
    }

    fn publish(&self, event: &str, payload: &serde_json::Value) {
        tracing::debug!(event, payload = %payload, "instrumentation event");
    }
}

/// Run `observer`, swallowing any panic it raises.
///
/// Returns the panic message when the observer failed.
pub fn isolated(label: &str, observer: impl FnOnce()) -> Result<(), String> {
    catch_unwind(AssertUnwindSafe(observer)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(observer = label, error = %message, "observer panicked; skipping");
        message
    })
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Publish an event through `instrumenter` in isolation.
pub fn publish(instrumenter: &dyn Instrumenter, event: &str, payload: serde_json::Value) {
    let _ = isolated(event, || instrumenter.publish(event, &payload));
}

/// Wrap `work` in a span. The span is marked failed when `work` returns `Err`.
pub async fn instrument<T, E, F>(
    instrumenter: &dyn Instrumenter,
    span: &str,
    payload: serde_json::Value,
    work: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let _ = isolated(span, || instrumenter.span_start(span, &payload));
    let started = Instant::now();
    let outcome = work.await;
    let elapsed = started.elapsed();
    let ok = outcome.is_ok();
    let _ = isolated(span, || instrumenter.span_end(span, &payload, elapsed, ok));
    outcome
}
