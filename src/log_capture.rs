//! Per-case log capture (C15 / §10): mirrors the `tracing` events
//! emitted during one `Scheduler::run_case` invocation into the
//! in-memory buffer that ships as `CaseResult.logs`.
//!
//! Grounded on the teacher's global `tracing_subscriber::fmt` setup
//! (`src/bin/sisyphus.rs::init_tracing`); this module adds a second,
//! narrowly-scoped `Layer` alongside the console formatter rather than
//! replacing it, so console output and the structured `logs[]` array
//! are populated from the same events without double-instrumentation.
//!
//! Events are attributed to the nearest enclosing `run_case` span by
//! walking the event's span scope and reading a `Buffer` stashed as
//! that span's extension data. This also covers the bounded-parallel
//! data-driven fan-out: `loop_driver::run` explicitly instruments each
//! spawned task with the caller's current span before handing it to
//! `JoinSet`, since `tokio::spawn` does not inherit span context on
//! its own.

use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Span, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Registry;

use crate::model::LogEntry;

const CASE_SPAN_NAME: &str = "run_case";

struct Buffer(Arc<Mutex<Vec<LogEntry>>>);

/// Opens the span a single `run_case` invocation logs under. Pass the
/// returned span to `.instrument(..)` and later to `drain`.
pub fn case_span(name: &str) -> Span {
    tracing::info_span!(CASE_SPAN_NAME, case = %name)
}

/// Tracing layer that stashes a fresh `Buffer` on every `run_case`
/// span and appends matching events to it. Install alongside the
/// console `fmt` layer in `init_tracing`.
pub struct CaseLogLayer;

impl<S> Layer<S> for CaseLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != CASE_SPAN_NAME {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut()
                .insert(Buffer(Arc::new(Mutex::new(Vec::new()))));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        for span in scope.from_root() {
            let extensions = span.extensions();
            let Some(buffer) = extensions.get::<Buffer>() else {
                continue;
            };
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            buffer.0.lock().unwrap().push(LogEntry {
                level: event.metadata().level().to_string(),
                message: visitor.message,
                step: visitor.step,
            });
            return;
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    step: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "step" => self.step = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Drains the `Buffer` attached to `span`, if the process-wide
/// subscriber is (or wraps) a `tracing_subscriber::Registry` carrying
/// `CaseLogLayer`. Returns an empty vec otherwise -- e.g. in unit
/// tests that never install the layer, where `CaseResult.logs` is
/// simply empty rather than an error.
pub fn drain(span: &Span) -> Vec<LogEntry> {
    span.with_subscriber(|(id, subscriber)| {
        let registry = subscriber.downcast_ref::<Registry>()?;
        let span_ref = registry.span(id)?;
        let buffer = span_ref.extensions().get::<Buffer>()?.0.clone();
        Some(std::mem::take(&mut *buffer.lock().unwrap()))
    })
    .flatten()
    .unwrap_or_default()
}
