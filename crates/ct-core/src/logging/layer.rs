//! Custom tracing layer for JSONL output.
//!
//! Writes one JSON object per event to stderr, leaving stdout to command
//! payloads. Correlation fields (`run_id`, `stream_id`, `host_id`, `stage`,
//! `round_id`, `arm`) are lifted to top-level keys whether they were recorded
//! on the event or on an enclosing span; everything else lands in `fields`.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const PROMOTED: &[&str] = &["run_id", "stream_id", "host_id", "stage", "round_id", "arm"];

/// Collects field values as JSON.
#[derive(Default)]
struct FieldCollector {
    values: Map<String, Value>,
    message: Option<String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.values.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // Non-finite floats have no JSON form.
        let v = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, v);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

/// Correlation fields recorded on a span.
#[derive(Debug, Clone, Default)]
struct SpanFields(Map<String, Value>);

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        let promoted: Map<String, Value> = collector
            .values
            .into_iter()
            .filter(|(k, _)| PROMOTED.contains(&k.as_str()))
            .collect();
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(promoted));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = Map::new();
        obj.insert("ts".to_string(), Value::String(Utc::now().to_rfc3339()));
        obj.insert("level".to_string(), serde_json::json!(level));
        obj.insert(
            "event".to_string(),
            Value::String(event.metadata().target().to_string()),
        );

        // Event fields win over span fields; innermost span wins over outer.
        let mut fields = collector.values;
        for key in PROMOTED {
            if let Some(v) = fields.remove(*key) {
                if !matches!(&v, Value::String(s) if s.is_empty()) {
                    obj.insert(key.to_string(), v);
                }
            }
        }
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    for (k, v) in &span_fields.0 {
                        obj.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
            }
        }

        if let Some(msg) = collector.message {
            obj.insert("message".to_string(), Value::String(msg));
        }
        if !fields.is_empty() {
            obj.insert("fields".to_string(), Value::Object(fields));
        }

        let line = Value::Object(obj).to_string();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::registry().with(JsonlLayer::new(buf.clone()));
        tracing::subscriber::with_default(subscriber, f);
        buf.lines()
    }

    #[test]
    fn event_line_has_core_keys() {
        let lines = capture(|| {
            tracing::info!(target: "round.selected", message = "picked");
        });
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["event"], "round.selected");
        assert_eq!(lines[0]["message"], "picked");
        assert!(lines[0]["ts"].is_string());
    }

    #[test]
    fn correlation_fields_are_promoted() {
        let lines = capture(|| {
            tracing::warn!(
                target: "outcome.rejected",
                run_id = "run-1",
                stream_id = "",
                round_id = 4u64,
                arm = 2u64,
                reward = 1.5,
                message = "out of bounds"
            );
        });
        let line = &lines[0];
        assert_eq!(line["run_id"], "run-1");
        assert_eq!(line["round_id"], 4);
        assert_eq!(line["arm"], 2);
        assert!(line.get("stream_id").is_none());
        assert_eq!(line["fields"]["reward"], 1.5);
        assert!(line["fields"].get("run_id").is_none());
    }

    #[test]
    fn span_fields_fill_gaps() {
        let lines = capture(|| {
            let span = tracing::info_span!("round", stream_id = "ct-s", stage = "observe");
            let _enter = span.enter();
            tracing::debug!(target: "outcome.applied", stage = "update", message = "ok");
        });
        assert_eq!(lines[0]["stream_id"], "ct-s");
        assert_eq!(lines[0]["stage"], "update");
    }

    #[test]
    fn non_finite_float_survives() {
        let lines = capture(|| {
            tracing::error!(target: "policy.halted", value = f64::NAN, message = "nan");
        });
        assert_eq!(lines[0]["fields"]["value"], "NaN");
    }
}
