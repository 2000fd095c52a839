//! Test utilities for verifying tracing output.
//!
//! [`init_test_tracing`] installs a thread-local subscriber whose layer
//! records every span and event, so tests can assert on the spans a reader
//! or commit opens and on the warnings it emits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// A recorded span or event.
#[derive(Debug, Clone)]
pub struct Captured {
    pub name: &'static str,
    pub level: Level,
    pub fields: HashMap<String, String>,
    /// Innermost enclosing span, if any
    pub parent_name: Option<String>,
}

impl Captured {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared storage for captured spans and events.
#[derive(Debug, Clone, Default)]
pub struct TraceStore {
    spans: Arc<Mutex<Vec<Captured>>>,
    events: Arc<Mutex<Vec<Captured>>>,
}

impl TraceStore {
    /// Returns true if a span with the given name was opened.
    pub fn has_span(&self, name: &str) -> bool {
        self.spans.lock().unwrap().iter().any(|s| s.name == name)
    }

    /// Returns all spans with the given name, in creation order.
    pub fn find_spans(&self, name: &str) -> Vec<Captured> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Returns events at `level` whose message equals `message`.
    pub fn find_events(&self, level: Level, message: &str) -> Vec<Captured> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level && e.field("message") == Some(message))
            .cloned()
            .collect()
    }
}

/// Visitor that records fields as strings.
struct FieldVisitor(HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

struct CaptureLayer {
    store: TraceStore,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, ctx: Context<'_, S>) {
        let mut fields = FieldVisitor(HashMap::new());
        attrs.record(&mut fields);
        let parent_name = attrs
            .parent()
            .and_then(|pid| ctx.span(pid))
            .map(|span| span.name().to_string())
            .or_else(|| ctx.lookup_current().map(|span| span.name().to_string()));
        let meta = attrs.metadata();
        self.store.spans.lock().unwrap().push(Captured {
            name: meta.name(),
            level: *meta.level(),
            fields: fields.0,
            parent_name,
        });
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = FieldVisitor(HashMap::new());
        event.record(&mut fields);
        let meta = event.metadata();
        self.store.events.lock().unwrap().push(Captured {
            name: meta.name(),
            level: *meta.level(),
            fields: fields.0,
            parent_name: ctx.lookup_current().map(|span| span.name().to_string()),
        });
    }
}

/// Capture spans and events for the current thread until the guard drops.
pub fn init_test_tracing() -> (TraceStore, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let store = TraceStore::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        store: store.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_span_fields_and_events() {
        let (store, _guard) = init_test_tracing();
        let _s = tracing::debug_span!("outer", count = 3u64, mode = "ids").entered();
        tracing::warn!(id = "a.1", "conflict");

        let spans = store.find_spans("outer");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field("count"), Some("3"));
        assert_eq!(spans[0].field("mode"), Some("ids"));

        let events = store.find_events(Level::WARN, "conflict");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].parent_name.as_deref(), Some("outer"));
        assert_eq!(events[0].field("id"), Some("a.1"));
    }
}
