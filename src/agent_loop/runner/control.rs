use std::sync::atomic::{AtomicU64, Ordering};

use super::super::events::{ObserverError, ObserverErrorSink, RunEvent, RunEventPayload, RunEventSink};
use super::super::types::RunId;
use crate::instrument::{isolated, Instrumenter};

/// Fans run events out to sinks, isolating each one.
pub(super) struct RunEventEmitter {
    run_id: RunId,
    seq: AtomicU64,
    sinks: Vec<RunEventSink>,
    error_sink: Option<ObserverErrorSink>,
}

impl RunEventEmitter {
    pub(super) fn new(
        run_id: RunId,
        sinks: Vec<RunEventSink>,
        error_sink: Option<ObserverErrorSink>,
    ) -> Self {
        Self {
            run_id,
            seq: AtomicU64::new(1),
            sinks,
            error_sink,
        }
    }

    pub(super) fn emit(&self, payload: RunEventPayload) {
        if self.sinks.is_empty() {
            return;
        }
        let event = RunEvent {
            run_id: self.run_id,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: chrono::Utc::now(),
            payload,
        };
        for (index, sink) in self.sinks.iter().enumerate() {
            let event = event.clone();
            if let Err(message) = isolated("run_event_sink", || sink(event)) {
                self.report(format!("event_sink[{index}]"), message);
            }
        }
    }

    /// Publish an instrumentation event, reporting a panicking instrumenter.
    pub(super) fn publish(
        &self,
        instrumenter: &dyn Instrumenter,
        event: &str,
        payload: serde_json::Value,
    ) {
        if let Err(message) = isolated(event, || instrumenter.publish(event, &payload)) {
            self.report(format!("instrumenter:{event}"), message);
        }
    }

    fn report(&self, observer: String, message: String) {
        let Some(sink) = &self.error_sink else {
            return;
        };
        let error = ObserverError {
            run_id: self.run_id,
            observer,
            message,
        };
        if isolated("observer_error_sink", || sink(error)).is_err() {
            tracing::warn!(run_id = %self.run_id, "observer error sink failed; dropping report");
        }
    }
}
