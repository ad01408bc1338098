//! Persistence primitives for checkpoint snapshots.
//!
//! This module is pure data transformation: it seals a [`Checkpoint`]
//! into a [`CheckpointEnvelope`] — gzip-compressed JSON plus a SHA-256
//! integrity hash and size records — and unseals envelopes back,
//! verifying integrity before any byte of state is interpreted. It
//! performs no I/O; the store backends persist envelopes as opaque rows.
//!
//! A hash mismatch, a size mismatch, or an implausible expansion ratio
//! raises [`CheckpointError::Corrupted`] rather than returning partial
//! data; corruption is always distinct from "not found".

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::store::CheckpointError;
use crate::state::WorkflowState;

/// Snapshots larger than this are refused at unseal time; a claimed raw
/// size beyond it indicates a corrupt or hostile envelope.
const MAX_RAW_LEN: u64 = 64 * 1024 * 1024;

/// Why a checkpoint was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    StateTransition,
    AgentComplete,
    UserApproval,
    ErrorOccurred,
    BeforeDestructive,
    Manual,
}

impl CheckpointTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateTransition => "state_transition",
            Self::AgentComplete => "agent_complete",
            Self::UserApproval => "user_approval",
            Self::ErrorOccurred => "error_occurred",
            Self::BeforeDestructive => "before_destructive",
            Self::Manual => "manual",
        }
    }

    /// Parse a persisted trigger string; unknown input maps to `Manual`
    /// so old rows keep loading after a trigger is renamed.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "state_transition" => Self::StateTransition,
            "agent_complete" => Self::AgentComplete,
            "user_approval" => Self::UserApproval,
            "error_occurred" => Self::ErrorOccurred,
            "before_destructive" => Self::BeforeDestructive,
            _ => Self::Manual,
        }
    }
}

impl std::fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consistency snapshot of a workflow thread.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub trigger: CheckpointTrigger,
    /// Human-readable cause, e.g. `"status routing -> executing"`.
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub state: WorkflowState,
}

impl Checkpoint {
    /// Snapshot `state` under a fresh id.
    pub fn capture(
        id: impl Into<String>,
        trigger: CheckpointTrigger,
        reason: impl Into<String>,
        state: &WorkflowState,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: state.thread_id.clone(),
            trigger,
            reason: reason.into(),
            created_at: Utc::now(),
            state: state.clone(),
        }
    }
}

/// Metadata row describing a stored checkpoint without its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub thread_id: String,
    pub trigger: CheckpointTrigger,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub raw_len: u64,
    pub compressed_len: u64,
}

/// The at-rest representation of a checkpoint.
///
/// `payload` is gzip-compressed JSON of the workflow state;
/// `integrity_hash` is the SHA-256 of the compressed payload. Both size
/// records participate in the integrity check at unseal time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub id: String,
    pub thread_id: String,
    pub trigger: CheckpointTrigger,
    pub reason: String,
    /// RFC 3339 creation time (keeps `chrono` types out of the at-rest shape).
    pub created_at: String,
    pub payload: Vec<u8>,
    pub integrity_hash: String,
    pub raw_len: u64,
    pub compressed_len: u64,
}

impl CheckpointEnvelope {
    /// Summary view of this envelope.
    #[must_use]
    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            trigger: self.trigger,
            reason: self.reason.clone(),
            created_at: parse_created_at(&self.created_at),
            raw_len: self.raw_len,
            compressed_len: self.compressed_len,
        }
    }
}

/// Seal a checkpoint into its at-rest envelope.
pub fn seal(checkpoint: &Checkpoint) -> Result<CheckpointEnvelope, CheckpointError> {
    let raw = serde_json::to_vec(&checkpoint.state)
        .map_err(|source| CheckpointError::Serde { source })?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .and_then(|()| encoder.finish())
        .map(|payload| CheckpointEnvelope {
            id: checkpoint.id.clone(),
            thread_id: checkpoint.thread_id.clone(),
            trigger: checkpoint.trigger,
            reason: checkpoint.reason.clone(),
            created_at: checkpoint.created_at.to_rfc3339(),
            integrity_hash: hash_hex(&payload),
            raw_len: raw.len() as u64,
            compressed_len: payload.len() as u64,
            payload,
        })
        .map_err(|source| CheckpointError::Io { source })
}

/// Unseal an envelope, verifying integrity before deserializing.
pub fn unseal(envelope: &CheckpointEnvelope) -> Result<Checkpoint, CheckpointError> {
    let corrupted = |detail: String| CheckpointError::Corrupted {
        checkpoint_id: envelope.id.clone(),
        detail,
    };

    if envelope.payload.len() as u64 != envelope.compressed_len {
        return Err(corrupted(format!(
            "payload is {} bytes but the envelope records {}",
            envelope.payload.len(),
            envelope.compressed_len
        )));
    }
    let actual_hash = hash_hex(&envelope.payload);
    if actual_hash != envelope.integrity_hash {
        return Err(corrupted(format!(
            "integrity hash mismatch: stored {} computed {}",
            envelope.integrity_hash, actual_hash
        )));
    }
    if envelope.raw_len > MAX_RAW_LEN {
        return Err(corrupted(format!(
            "recorded raw size {} exceeds the {} byte limit",
            envelope.raw_len, MAX_RAW_LEN
        )));
    }

    let mut raw = Vec::with_capacity(envelope.raw_len as usize);
    let mut decoder = GzDecoder::new(&envelope.payload[..]).take(MAX_RAW_LEN + 1);
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| corrupted(format!("payload does not decompress: {e}")))?;
    if raw.len() as u64 != envelope.raw_len {
        return Err(corrupted(format!(
            "decompressed to {} bytes but the envelope records {}",
            raw.len(),
            envelope.raw_len
        )));
    }

    let state: WorkflowState = serde_json::from_slice(&raw)
        .map_err(|e| corrupted(format!("state does not deserialize: {e}")))?;

    Ok(Checkpoint {
        id: envelope.id.clone(),
        thread_id: envelope.thread_id.clone(),
        trigger: envelope.trigger,
        reason: envelope.reason.clone(),
        created_at: parse_created_at(&envelope.created_at),
        state,
    })
}

fn parse_created_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
