//! Durable state snapshots: persistence envelope, stores, and triggers.
//!
//! The checkpoint subsystem takes consistency snapshots of a
//! [`WorkflowState`](crate::state::WorkflowState) around defined events so
//! a crash or a rejected round can be rolled back to a known-good point.
//!
//! # Layering
//!
//! - [`persistence`] — pure data transformation: sealing a [`Checkpoint`]
//!   into a compressed, integrity-hashed [`CheckpointEnvelope`] and back.
//!   No I/O.
//! - [`store`] — the [`CheckpointStore`] contract plus the in-memory
//!   backend. Per-checkpoint atomicity, no cross-thread locking; distinct
//!   `NotFound` and `Corrupted` outcomes.
//! - [`store_sqlite`] — durable SQLite backend (feature `sqlite`).
//! - [`triggers`] — the [`TriggerManager`] deciding *when* to snapshot;
//!   its failures never abort the workflow, with one deliberate
//!   exception before destructive operations.

pub mod persistence;
pub mod store;
#[cfg(feature = "sqlite")]
pub mod store_sqlite;
pub mod triggers;

pub use persistence::{Checkpoint, CheckpointEnvelope, CheckpointSummary, CheckpointTrigger};
pub use store::{CheckpointError, CheckpointStore, InMemoryCheckpointStore};
#[cfg(feature = "sqlite")]
pub use store_sqlite::{HistoryPage, HistoryQuery, SqliteCheckpointStore};
pub use triggers::{TriggerConfig, TriggerManager};
