//! Event bus: receives events from components and broadcasts to sinks.

use std::sync::{Arc, Mutex};

use tokio::{sync::oneshot, task};

use super::event::{Event, EventSender};
use super::sink::{EventSink, StdOutSink};

/// Broadcasts orchestration events to a set of sinks.
///
/// Components hold a cloned [`EventSender`] obtained from
/// [`EventBus::sender`]; a background listener drains the channel and
/// fans events out to every sink. Emission is non-blocking and losing
/// the listener only costs observability, never correctness.
///
/// The bus is constructed explicitly and injected into the engine
/// builder — one bus per engine, no globals.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Mutex<Option<ListenerState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink)
    }
}

impl EventBus {
    /// Bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    /// Add a sink after construction (e.g. a per-request stream).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    /// Cloneable sending half for components.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.channel.0.clone()
    }

    /// Spawn the background listener. Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks = sinks.lock().expect("sinks poisoned");
                            for sink in sinks.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::debug!(error = %e, "event sink failed");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining nothing further.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
