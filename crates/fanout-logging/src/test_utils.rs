//! In-memory event capture for asserting on logs in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Rendered `message` field.
    pub message: String,
    /// Every other field, rendered as text.
    pub fields: BTreeMap<&'static str, String>,
}

impl CapturedEvent {
    /// Rendered value of `name`, if the event carried it.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Handle to the events recorded by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs {
    sink: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    fn with<R>(&self, f: impl FnOnce(&mut Vec<CapturedEvent>) -> R) -> R {
        let mut events = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut events)
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.with(|events| events.clone())
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.with(|events| {
            events
                .iter()
                .any(|e| e.level == level && e.message.contains(needle))
        })
    }

    /// Number of events recorded at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.with(|events| events.iter().filter(|e| e.level == level).count())
    }

    /// Events whose message contains `needle`, in emission order.
    pub fn matching(&self, needle: &str) -> Vec<CapturedEvent> {
        self.with(|events| {
            events
                .iter()
                .filter(|e| e.message.contains(needle))
                .cloned()
                .collect()
        })
    }
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: BTreeMap<&'static str, String>,
}

impl Recorder {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            let _ = self.fields.insert(field.name(), value);
        }
    }
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

struct RecordingLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for RecordingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        let meta = event.metadata();
        let captured = CapturedEvent {
            level: *meta.level(),
            message: recorder.message,
            fields: recorder.fields,
        };
        self.0.with(|events| events.push(captured));
    }
}

/// Record every event emitted on this thread while the guard lives.
///
/// On a current-thread tokio runtime this includes spawned tasks.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(RecordingLayer(logs.clone()))
        .set_default();
    (logs, guard)
}
