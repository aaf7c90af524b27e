//! Tracing utilities for asserting on dispatcher spans and events.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::dispatcher::DefaultGuard;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// A span or event captured during a test.
#[derive(Debug, Clone)]
pub struct Captured {
    /// Span name, or the event message.
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl Captured {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name().to_owned(), value.to_owned()));
    }
}

#[derive(Default)]
struct Captures {
    spans: Vec<Captured>,
    events: Vec<Captured>,
}

struct CaptureLayer {
    captures: Arc<Mutex<Captures>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let metadata = attrs.metadata();
        if !metadata.name().starts_with("volley.") {
            return;
        }
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        self.captures.lock().spans.push(Captured {
            name: metadata.name().to_owned(),
            fields: visitor.fields,
        });
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !event.metadata().target().starts_with("volley") {
            return;
        }
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.captures.lock().events.push(Captured {
            name: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        });
    }
}

/// Collector of the spans and events emitted by volley crates.
#[derive(Clone)]
pub struct TraceCollector {
    captures: Arc<Mutex<Captures>>,
    dispatch: Dispatch,
}

impl TraceCollector {
    pub fn new() -> Self {
        let captures = Arc::new(Mutex::new(Captures::default()));
        let layer = CaptureLayer {
            captures: Arc::clone(&captures),
        };
        let dispatch = Dispatch::new(Registry::default().with(layer));
        Self { captures, dispatch }
    }

    /// Installs the collector for the current thread until the guard drops.
    ///
    /// Use a current-thread runtime so that spawned units of work run on the
    /// same thread.
    pub fn install(&self) -> DefaultGuard {
        tracing::dispatcher::set_default(&self.dispatch)
    }

    pub fn spans(&self) -> Vec<Captured> {
        self.captures.lock().spans.clone()
    }

    pub fn events(&self) -> Vec<Captured> {
        self.captures.lock().events.clone()
    }

    pub fn span(&self, name: &str) -> Option<Captured> {
        self.captures
            .lock()
            .spans
            .iter()
            .rev()
            .find(|span| span.name == name)
            .cloned()
    }

    /// Values of the `state` field of every event, in order.
    pub fn states(&self) -> Vec<String> {
        self.captures
            .lock()
            .events
            .iter()
            .filter_map(|event| event.field("state").map(str::to_owned))
            .collect()
    }
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use tracing::{debug, info_span};

    use super::*;

    #[test]
    fn test_captures_volley_spans_only() {
        let collector = TraceCollector::new();
        {
            let _guard = collector.install();
            let _volley = info_span!("volley.fetch", key = "k1").entered();
            let _other = info_span!("other.span").entered();
        }
        let spans = collector.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field("key"), Some("k1"));
    }

    #[test]
    fn test_event_states() {
        let collector = TraceCollector::new();
        {
            let _guard = collector.install();
            debug!(target: "volley::dispatcher", state = %"joined", "joined in-flight request");
            debug!(target: "elsewhere", state = %"ignored", "not ours");
        }
        assert_eq!(collector.states(), vec!["joined".to_owned()]);
        assert_eq!(collector.events()[0].name, "joined in-flight request");
    }
}
