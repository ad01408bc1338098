//! Sinks consuming broadcast events.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::event::Event;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink channel disconnected")]
    Disconnected,
    #[error("sink failure: {0}")]
    Other(String),
}

/// A destination for broadcast events.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError>;
}

/// Writes events to stdout; the default sink.
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        println!("{event}");
        Ok(())
    }
}

/// Collects events into a shared vector; intended for tests and
/// post-run inspection.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Other("sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel (e.g. for live streaming to a
/// client connection).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}
