//! The checkpoint store contract and the in-memory backend.
//!
//! Stores persist sealed [`CheckpointEnvelope`]s as opaque rows. The
//! contract the orchestration core depends on is small: save returns an
//! id, load distinguishes `NotFound` from `Corrupted`, and history is
//! queryable per thread. Writes from different threads never interfere —
//! only per-checkpoint atomicity is required.

use std::sync::Mutex;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::persistence::{self, Checkpoint, CheckpointEnvelope, CheckpointSummary};

/// Errors raised by checkpoint persistence.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint not found: {checkpoint_id}")]
    #[diagnostic(code(loomflow::checkpoint::not_found))]
    NotFound { checkpoint_id: String },

    /// The snapshot failed its integrity check; never downgraded to
    /// "not found" and never returns partial data.
    #[error("checkpoint {checkpoint_id} is corrupted: {detail}")]
    #[diagnostic(
        code(loomflow::checkpoint::corrupted),
        help("The stored snapshot failed its hash/size verification. Restore from an earlier checkpoint.")
    )]
    Corrupted {
        checkpoint_id: String,
        detail: String,
    },

    #[error("checkpoint serialization failed: {source}")]
    #[diagnostic(code(loomflow::checkpoint::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint compression failed: {source}")]
    #[diagnostic(code(loomflow::checkpoint::io))]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(loomflow::checkpoint::backend))]
    Backend { message: String },
}

/// Durable key-value persistence for state snapshots, keyed by workflow
/// thread and checkpoint id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `checkpoint` and return its id.
    async fn save(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError>;

    /// Load a specific checkpoint; `NotFound` and `Corrupted` are
    /// distinct outcomes.
    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError>;

    /// Load the most recent checkpoint of `thread_id`, if any.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// All checkpoints of `thread_id`, newest first, without payloads.
    async fn list_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError>;
}

/// Volatile store for tests and single-process development.
///
/// Envelopes are kept sealed exactly as a durable backend would keep
/// them, so integrity verification runs on every load here too.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    by_thread: Mutex<FxHashMap<String, Vec<CheckpointEnvelope>>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an already-sealed envelope, e.g. one exported from a
    /// durable backend.
    pub fn insert_envelope(&self, envelope: CheckpointEnvelope) {
        self.by_thread
            .lock()
            .expect("store poisoned")
            .entry(envelope.thread_id.clone())
            .or_default()
            .push(envelope);
    }

    /// Sealed envelope for `checkpoint_id`, if present.
    #[must_use]
    pub fn envelope(&self, checkpoint_id: &str) -> Option<CheckpointEnvelope> {
        self.by_thread
            .lock()
            .expect("store poisoned")
            .values()
            .flatten()
            .find(|e| e.id == checkpoint_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError> {
        let envelope = persistence::seal(&checkpoint)?;
        let id = envelope.id.clone();
        self.insert_envelope(envelope);
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let envelope = self
            .envelope(checkpoint_id)
            .ok_or_else(|| CheckpointError::NotFound {
                checkpoint_id: checkpoint_id.to_string(),
            })?;
        persistence::unseal(&envelope)
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let envelope = {
            let guard = self.by_thread.lock().expect("store poisoned");
            guard.get(thread_id).and_then(|v| v.last()).cloned()
        };
        match envelope {
            Some(envelope) => persistence::unseal(&envelope).map(Some),
            None => Ok(None),
        }
    }

    async fn list_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let guard = self.by_thread.lock().expect("store poisoned");
        let mut summaries: Vec<CheckpointSummary> = guard
            .get(thread_id)
            .map(|envelopes| envelopes.iter().map(CheckpointEnvelope::summary).collect())
            .unwrap_or_default();
        summaries.reverse();
        Ok(summaries)
    }
}
