//! Validation of states restored from checkpoints.
//!
//! Resume-from-checkpoint failures are tagged with the phase where
//! reconstruction broke, so operators know whether the snapshot itself,
//! the workflow shape, the agent bookkeeping, the referenced context, or
//! the storage layer is at fault. Structurally impossible recoveries list
//! their blockers explicitly instead of failing opaquely.

use miette::Diagnostic;
use thiserror::Error;

use crate::checkpoint::Checkpoint;
use crate::state::{WorkflowState, WorkflowStatus};

/// Where reconstruction broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPhase {
    Validation,
    Workflow,
    Agents,
    Context,
    Filesystem,
}

impl std::fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Workflow => "workflow",
            Self::Agents => "agents",
            Self::Context => "context",
            Self::Filesystem => "filesystem",
        };
        f.write_str(label)
    }
}

/// Errors surfaced to a caller attempting a resume.
#[derive(Debug, Error, Diagnostic)]
pub enum RecoveryError {
    #[error("recovery failed during {phase}: {message}")]
    #[diagnostic(
        code(loomflow::recovery::failed),
        help("The checkpoint loaded but could not be reconstructed into a runnable state.")
    )]
    Failed {
        phase: RecoveryPhase,
        message: String,
    },

    /// Recovery is structurally impossible; `blockers` lists why.
    #[error("recovery blocked: {}", blockers.join("; "))]
    #[diagnostic(code(loomflow::recovery::blocked))]
    Blocked { blockers: Vec<String> },
}

impl RecoveryError {
    pub fn failed(phase: RecoveryPhase, message: impl Into<String>) -> Self {
        Self::Failed {
            phase,
            message: message.into(),
        }
    }

    pub fn blocked(blockers: Vec<String>) -> Self {
        Self::Blocked { blockers }
    }
}

/// Check that a restored checkpoint reconstructs a valid, runnable state
/// for `expected_thread`.
pub fn validate_restored(
    checkpoint: Checkpoint,
    expected_thread: &str,
) -> Result<WorkflowState, RecoveryError> {
    if checkpoint.thread_id != expected_thread {
        return Err(RecoveryError::failed(
            RecoveryPhase::Validation,
            format!(
                "checkpoint {} belongs to thread {}, not {}",
                checkpoint.id, checkpoint.thread_id, expected_thread
            ),
        ));
    }
    let state = checkpoint.state;

    if state.thread_id != expected_thread {
        return Err(RecoveryError::failed(
            RecoveryPhase::Validation,
            "snapshot state carries a different thread id than its envelope",
        ));
    }

    if state.status == WorkflowStatus::AwaitingApproval && state.pending_approval.is_none() {
        return Err(RecoveryError::failed(
            RecoveryPhase::Workflow,
            "state is awaiting approval but no pending round was persisted",
        ));
    }

    if state.retry_count > state.max_retries {
        return Err(RecoveryError::failed(
            RecoveryPhase::Agents,
            format!(
                "retry counter {} exceeds the budget {}",
                state.retry_count, state.max_retries
            ),
        ));
    }
    if state.style_iteration_count > state.max_style_iterations {
        return Err(RecoveryError::failed(
            RecoveryPhase::Agents,
            format!(
                "rejection counter {} exceeds the cap {}",
                state.style_iteration_count, state.max_style_iterations
            ),
        ));
    }

    if let Some(pending) = &state.pending_approval
        && pending.thread_id != state.thread_id
    {
        return Err(RecoveryError::failed(
            RecoveryPhase::Context,
            "pending approval round references a different thread",
        ));
    }

    Ok(state)
}
