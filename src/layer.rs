use crate::capture::ErrorCapture;
use crate::context::depth;
use crate::normalize::severity_for_level;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that feeds events into
/// [`ErrorCapture::handle_error`] as non-fatal runtime faults.
///
/// By default only `WARN` and `ERROR` events are captured; `WARN` becomes
/// a `WARNING` record and `ERROR` an `ERROR` record. Events emitted by this
/// crate are ignored, as are events raised while the thread already runs
/// as many nested captures as [`ErrorCapture::max_depth`] allows.
pub struct ErrorCaptureLayer {
    capture: Arc<ErrorCapture>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the capture pipeline.
    pub captured_events: Arc<AtomicU64>,
    /// Events dropped because the nesting limit was reached.
    pub reentrant_events: Arc<AtomicU64>,
}

impl ErrorCaptureLayer {
    /// Create a layer capturing events at `min_level` or more severe.
    ///
    /// Levels below `INFO` have no severity and are clamped to `INFO`.
    pub fn new(capture: Arc<ErrorCapture>, min_level: Level) -> Self {
        let min_level = if min_level > Level::INFO {
            Level::INFO
        } else {
            min_level
        };
        Self {
            capture,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            captured_events: Arc::new(AtomicU64::new(0)),
            reentrant_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for ErrorCaptureLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }
        let Some(severity) = severity_for_level(meta.level()) else {
            return;
        };
        if depth() >= self.capture.max_depth() {
            self.reentrant_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let text = render_message(message.as_deref(), &fields);
        self.capture.handle_error(
            severity.code(),
            &text,
            meta.file().unwrap_or_default(),
            meta.line(),
        );
        self.captured_events.fetch_add(1, Ordering::Relaxed);
    }
}

// "message key=value key=value"
fn render_message(message: Option<&str>, fields: &BTreeMap<String, String>) -> String {
    let mut out = message.unwrap_or_default().to_string();
    for (key, value) in fields {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{}={}", key, value);
    }
    out
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, String>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}
