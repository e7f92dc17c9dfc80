//! Tracing layer that mirrors engine log records onto the event bus.
//!
//! UIs subscribe to [`EventChannel::Log`](orbit_core::event::EventChannel::Log)
//! and render engine logs next to process output without scraping stderr.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use orbit_core::event::{EngineEvent, EventBus, LogRecord};

/// Forwards tracing events whose target starts with one of `prefixes`.
pub struct EventBusLayer {
    bus: EventBus,
    prefixes: Vec<String>,
}

impl EventBusLayer {
    /// Forwards `orbit*` targets.
    pub fn new(bus: EventBus) -> Self {
        Self::with_prefixes(bus, ["orbit"])
    }

    pub fn with_prefixes<I, S>(bus: EventBus, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bus,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn accepts(&self, target: &str) -> bool {
        self.prefixes.iter().any(|p| target.starts_with(p.as_str()))
    }
}

impl<S> Layer<S> for EventBusLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.accepts(metadata.target()) {
            return;
        }

        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        // Nobody listening is fine: publish just reports zero receivers.
        self.bus.publish(EngineEvent::Log(LogRecord {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            message,
            fields,
            timestamp: Utc::now(),
        }));
    }
}

struct FieldVisitor<'a>(&'a mut BTreeMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::from(format!("{value:?}")));
    }
}
