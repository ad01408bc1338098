//! Observability events for the orchestration core.
//!
//! Components emit [`Event`]s (decision made, dispatch settled, approval
//! requested, checkpoint saved/failed) through a cloned sender; the
//! [`EventBus`] broadcasts them to pluggable sinks. The bus is always
//! constructed explicitly and injected — there is no global instance.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{Event, EventScope, EventSender};
pub use sink::{ChannelSink, EventSink, MemorySink, SinkError, StdOutSink};
