//! In-memory peer transports for tests.

use async_trait::async_trait;
use fanout_core::{Message, PeerError};
use tokio::sync::mpsc;

use crate::peer::PeerSink;

/// What a test sink observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    /// A text frame was written.
    Text(String),
    /// A write started and will never finish.
    Stalled(String),
    /// A write was attempted and failed.
    Failed(String),
    /// The connection was closed.
    Closed,
}

#[derive(Clone, Copy)]
enum Mode {
    Record,
    Stall,
    Fail,
    /// Writes and close both hang, like a peer that stopped reading.
    Dead,
}

pub(crate) struct TestSink {
    mode: Mode,
    events: mpsc::UnboundedSender<SinkEvent>,
}

#[async_trait]
impl PeerSink for TestSink {
    async fn send_text(&mut self, message: &Message) -> Result<(), PeerError> {
        let text = message.as_str().to_string();
        match self.mode {
            Mode::Record => {
                let _ = self.events.send(SinkEvent::Text(text));
                Ok(())
            }
            Mode::Stall | Mode::Dead => {
                let _ = self.events.send(SinkEvent::Stalled(text));
                std::future::pending::<()>().await;
                Ok(())
            }
            Mode::Fail => {
                let _ = self.events.send(SinkEvent::Failed(text));
                Err(PeerError::Send("connection reset".into()))
            }
        }
    }

    async fn close(&mut self) {
        if matches!(self.mode, Mode::Dead) {
            std::future::pending::<()>().await;
        }
        let _ = self.events.send(SinkEvent::Closed);
    }
}

fn sink(mode: Mode) -> (TestSink, mpsc::UnboundedReceiver<SinkEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    (TestSink { mode, events }, rx)
}

/// Sink that accepts every write immediately.
pub(crate) fn recording_sink() -> (TestSink, mpsc::UnboundedReceiver<SinkEvent>) {
    sink(Mode::Record)
}

/// Sink whose first write never completes.
pub(crate) fn stalled_sink() -> (TestSink, mpsc::UnboundedReceiver<SinkEvent>) {
    sink(Mode::Stall)
}

/// Sink whose writes always fail.
pub(crate) fn failing_sink() -> (TestSink, mpsc::UnboundedReceiver<SinkEvent>) {
    sink(Mode::Fail)
}

/// Sink whose writes and close never complete.
///
/// The event receiver ends once the sink is dropped.
pub(crate) fn dead_sink() -> (TestSink, mpsc::UnboundedReceiver<SinkEvent>) {
    sink(Mode::Dead)
}

/// Texts written so far, without waiting.
pub(crate) fn written(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SinkEvent::Text(text) = event {
            out.push(text);
        }
    }
    out
}
