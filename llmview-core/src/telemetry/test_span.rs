#![cfg(test)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Subscriber};
use tracing_core::field::{Field, Visit};
use tracing_subscriber::registry;
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Fields recorded on one span, stringified.
#[derive(Default, Debug, Clone)]
pub struct SpanData {
    pub name: String,
    pub fields: HashMap<String, String>,
}

#[derive(Default, Debug)]
pub struct SpanStore {
    spans: Mutex<Vec<SpanData>>,
    ids: Mutex<HashMap<span::Id, usize>>,
}

impl SpanStore {
    /// All captured spans with the given name, in creation order.
    pub fn named(&self, name: &str) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

struct FieldVisitor<'a> {
    map: &'a mut HashMap<String, String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn core::fmt::Debug) {
        self.map.insert(field.name().to_string(), format!("{value:?}"));
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        self.map.insert(field.name().to_string(), value.to_string());
    }
}

#[derive(Clone)]
struct CaptureLayer {
    store: Arc<SpanStore>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, _ctx: Context<'_, S>) {
        let mut data = SpanData {
            name: attrs.metadata().name().to_string(),
            ..Default::default()
        };
        attrs.record(&mut FieldVisitor { map: &mut data.fields });
        let mut spans = self.store.spans.lock().unwrap();
        spans.push(data);
        self.store
            .ids
            .lock()
            .unwrap()
            .insert(id.clone(), spans.len() - 1);
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, _ctx: Context<'_, S>) {
        let Some(&slot) = self.store.ids.lock().unwrap().get(id) else {
            return;
        };
        if let Some(data) = self.store.spans.lock().unwrap().get_mut(slot) {
            values.record(&mut FieldVisitor { map: &mut data.fields });
        }
    }
}

/// Install a capturing subscriber for the current thread. Spans are recorded
/// until the returned guard drops.
pub fn install_capture() -> (Arc<SpanStore>, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::prelude::*;
    let store = Arc::new(SpanStore::default());
    let layer = CaptureLayer {
        store: store.clone(),
    };
    let subscriber = registry::Registry::default().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}
