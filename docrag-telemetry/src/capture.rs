//! In-memory capture of query spans.
//!
//! [`QueryTraceLayer`] records every span carrying a `query.id` field (or
//! nested under one) together with the events logged inside it, and stores
//! them in a [`QueryTraceStorage`] keyed by that id. Storage keeps at most
//! `capacity` queries and evicts the oldest first.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Span field that keys captured traces.
pub const QUERY_ID_FIELD: &str = "query.id";

/// Default number of queries retained.
pub const DEFAULT_CAPACITY: usize = 256;

/// A log event recorded inside a captured span.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub message: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
}

/// A closed span belonging to a query.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedSpan {
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    /// Nanoseconds since the Unix epoch.
    pub start_time: u128,
    pub end_time: u128,
    pub attributes: HashMap<String, serde_json::Value>,
    pub events: Vec<CapturedEvent>,
}

impl CapturedSpan {
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Default)]
struct Traces {
    spans: HashMap<String, Vec<CapturedSpan>>,
    order: VecDeque<String>,
}

/// Bounded storage of captured spans, keyed by query id.
#[derive(Debug)]
pub struct QueryTraceStorage {
    capacity: usize,
    traces: RwLock<Traces>,
}

impl Default for QueryTraceStorage {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl QueryTraceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage retaining at most `capacity` queries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), traces: RwLock::new(Traces::default()) }
    }

    /// Spans captured for `query_id`, in close order.
    pub fn get_trace(&self, query_id: &str) -> Option<Vec<CapturedSpan>> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.spans.get(query_id).cloned()
    }

    /// Ids of retained queries, oldest first.
    pub fn query_ids(&self) -> Vec<String> {
        let traces = self.traces.read().unwrap_or_else(PoisonError::into_inner);
        traces.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.traces.read().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        traces.spans.clear();
        traces.order.clear();
    }

    fn add_span(&self, query_id: String, span: CapturedSpan) {
        let mut traces = self.traces.write().unwrap_or_else(PoisonError::into_inner);
        if !traces.spans.contains_key(&query_id) {
            while traces.order.len() >= self.capacity {
                match traces.order.pop_front() {
                    Some(oldest) => {
                        traces.spans.remove(&oldest);
                    }
                    None => break,
                }
            }
            traces.order.push_back(query_id.clone());
        }
        traces.spans.entry(query_id).or_default().push(span);
    }
}

/// A tracing layer that captures query spans into a [`QueryTraceStorage`].
pub struct QueryTraceLayer {
    storage: Arc<QueryTraceStorage>,
}

impl QueryTraceLayer {
    pub fn new(storage: Arc<QueryTraceStorage>) -> Self {
        Self { storage }
    }
}

struct SpanState {
    start_time: u128,
    fields: HashMap<String, serde_json::Value>,
    events: Vec<CapturedEvent>,
}

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for QueryTraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        // Child spans inherit the query id of their parent.
        if !fields.contains_key(QUERY_ID_FIELD) {
            if let Some(parent) = span.parent() {
                if let Some(query_id) = parent
                    .extensions()
                    .get::<SpanState>()
                    .and_then(|state| state.fields.get(QUERY_ID_FIELD).cloned())
                {
                    fields.insert(QUERY_ID_FIELD.to_string(), query_id);
                }
            }
        }

        span.extensions_mut().insert(SpanState { start_time: now_nanos(), fields, events: Vec::new() });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(state) = extensions.get_mut::<SpanState>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            state.fields.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.event_span(event) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        let Some(state) = extensions.get_mut::<SpanState>() else {
            return;
        };
        if !state.fields.contains_key(QUERY_ID_FIELD) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").and_then(|v| v.as_str().map(str::to_string));
        state.events.push(CapturedEvent {
            level: event.metadata().level().to_string(),
            message,
            fields,
        });
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let Some(state) = span.extensions_mut().remove::<SpanState>() else {
            return;
        };
        let Some(query_id) =
            state.fields.get(QUERY_ID_FIELD).and_then(|v| v.as_str()).map(str::to_string)
        else {
            return;
        };

        let captured = CapturedSpan {
            span_id: format!("{:016x}", id.into_u64()),
            parent_span_id: span.parent().map(|p| format!("{:016x}", p.id().into_u64())),
            name: span.metadata().name().to_string(),
            start_time: state.start_time,
            end_time: now_nanos(),
            attributes: state.fields,
            events: state.events,
        };
        self.storage.add_span(query_id, captured);
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use tracing::info_span;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    fn capture(storage: Arc<QueryTraceStorage>) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(QueryTraceLayer::new(storage))
    }

    #[test]
    fn captures_query_spans_and_their_events() {
        let storage = Arc::new(QueryTraceStorage::new());
        tracing::subscriber::with_default(capture(storage.clone()), || {
            let span = info_span!("rag.query", query.id = "q-1", mode = "general");
            let _guard = span.enter();
            tracing::debug!(state = "RETRIEVING", "query state");
            let child = info_span!("rag.retrieve");
            let _child = child.enter();
            tracing::info!(result_count = 3u64, "retrieved");
        });

        let spans = storage.get_trace("q-1").unwrap();
        assert_eq!(spans.len(), 2);
        let child = &spans[0];
        assert_eq!(child.name, "rag.retrieve");
        assert_eq!(child.events[0].fields["result_count"], 3);
        let root = &spans[1];
        assert_eq!(root.name, "rag.query");
        assert_eq!(root.attribute_str("mode"), Some("general"));
        assert_eq!(root.events[0].message.as_deref(), Some("query state"));
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
    }

    #[test]
    fn spans_without_query_id_are_ignored() {
        let storage = Arc::new(QueryTraceStorage::new());
        tracing::subscriber::with_default(capture(storage.clone()), || {
            let span = info_span!("rag.ingest", document.id = "doc");
            let _guard = span.enter();
            tracing::info!("ingested");
        });
        assert!(storage.is_empty());
    }

    #[test]
    fn storage_evicts_oldest_query() {
        let storage = Arc::new(QueryTraceStorage::with_capacity(2));
        tracing::subscriber::with_default(capture(storage.clone()), || {
            for id in ["a", "b", "c"] {
                let _span = info_span!("rag.query", query.id = id).entered();
            }
        });
        assert_eq!(storage.query_ids(), vec!["b", "c"]);
        assert!(storage.get_trace("a").is_none());
    }
}
