//! Decides *when* to snapshot and calls the store.
//!
//! Every trigger point is independently toggleable. Trigger-layer
//! failures are caught, logged, and emitted as events — a checkpoint
//! failure never aborts the underlying workflow action — with one
//! deliberate exception: [`TriggerManager::before_destructive_operation`]
//! escalates a failed write by default, because that snapshot is the only
//! thing making the destructive operation recoverable. Set
//! [`TriggerConfig::escalate_destructive_failures`] to `false` to restore
//! uniform swallowing.

use std::sync::Arc;

use tracing::instrument;

use super::persistence::{Checkpoint, CheckpointTrigger};
use super::store::{CheckpointError, CheckpointStore};
use crate::events::{Event, EventScope, EventSender};
use crate::ids::IdGenerator;
use crate::state::{WorkflowState, WorkflowStatus};

/// Which events snapshot, and how destructive operations are handled.
#[derive(Clone, Debug)]
pub struct TriggerConfig {
    pub on_state_transition: bool,
    pub on_agent_complete: bool,
    pub on_user_approval: bool,
    pub on_error: bool,
    pub on_before_destructive: bool,
    /// Operations counted as destructive; anything else passes
    /// [`TriggerManager::before_destructive_operation`] without a
    /// snapshot.
    pub destructive_ops: Vec<String>,
    /// Escalate a failed before-destructive snapshot to the caller
    /// instead of swallowing it.
    pub escalate_destructive_failures: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            on_state_transition: true,
            on_agent_complete: true,
            on_user_approval: true,
            on_error: true,
            on_before_destructive: true,
            destructive_ops: vec![
                "delete".to_string(),
                "overwrite".to_string(),
                "deploy".to_string(),
                "external_write".to_string(),
            ],
            escalate_destructive_failures: true,
        }
    }
}

/// Takes snapshots around defined events.
///
/// Constructed with an explicit store and event sender; the engine owns
/// one per instance.
pub struct TriggerManager {
    store: Arc<dyn CheckpointStore>,
    config: TriggerConfig,
    ids: IdGenerator,
    events: EventSender,
}

impl TriggerManager {
    pub fn new(store: Arc<dyn CheckpointStore>, config: TriggerConfig, events: EventSender) -> Self {
        Self {
            store,
            config,
            ids: IdGenerator::new(),
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Snapshot on a status transition. Returns the checkpoint id when
    /// one was written.
    pub async fn on_state_transition(
        &self,
        state: &WorkflowState,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Option<String> {
        if !self.config.on_state_transition {
            return None;
        }
        self.guarded(
            state,
            CheckpointTrigger::StateTransition,
            format!("status {from} -> {to}"),
        )
        .await
    }

    /// Snapshot after a worker (or fan-out group) settled.
    pub async fn on_agent_complete(&self, state: &WorkflowState, role: &str) -> Option<String> {
        if !self.config.on_agent_complete {
            return None;
        }
        self.guarded(
            state,
            CheckpointTrigger::AgentComplete,
            format!("agent {role} completed"),
        )
        .await
    }

    /// Snapshot after a human decision was applied.
    pub async fn on_user_approval(&self, state: &WorkflowState, decision: &str) -> Option<String> {
        if !self.config.on_user_approval {
            return None;
        }
        self.guarded(
            state,
            CheckpointTrigger::UserApproval,
            format!("approval decision: {decision}"),
        )
        .await
    }

    /// Snapshot after an error was folded into the state.
    pub async fn on_error(&self, state: &WorkflowState, error: &str) -> Option<String> {
        if !self.config.on_error {
            return None;
        }
        self.guarded(
            state,
            CheckpointTrigger::ErrorOccurred,
            format!("error: {error}"),
        )
        .await
    }

    /// On-demand snapshot; the only trigger that reports its failure to
    /// the caller, since callers ask for it deliberately.
    pub async fn checkpoint_now(
        &self,
        state: &WorkflowState,
        reason: impl Into<String>,
    ) -> Result<String, CheckpointError> {
        let checkpoint = Checkpoint::capture(
            self.ids.checkpoint_id(),
            CheckpointTrigger::Manual,
            reason,
            state,
        );
        let id = self.store.save(checkpoint).await?;
        self.emit_saved(state, &id, CheckpointTrigger::Manual);
        Ok(id)
    }

    /// Guarantee a durable snapshot before a destructive external action.
    ///
    /// Always grants permission (`Ok(true)`) when the snapshot is written
    /// or the operation is not in the tracked set — destructive
    /// operations are made recoverable, not preventable. A failed write
    /// escalates unless configured otherwise.
    #[instrument(skip(self, state))]
    pub async fn before_destructive_operation(
        &self,
        state: &WorkflowState,
        op: &str,
        target: &str,
    ) -> Result<bool, CheckpointError> {
        if !self.config.on_before_destructive || !self.is_destructive(op) {
            return Ok(true);
        }
        let checkpoint = Checkpoint::capture(
            self.ids.checkpoint_id(),
            CheckpointTrigger::BeforeDestructive,
            format!("before {op} on {target}"),
            state,
        );
        match self.store.save(checkpoint).await {
            Ok(id) => {
                self.emit_saved(state, &id, CheckpointTrigger::BeforeDestructive);
                Ok(true)
            }
            Err(e) if self.config.escalate_destructive_failures => Err(e),
            Err(e) => {
                self.report_failure(state, CheckpointTrigger::BeforeDestructive, &e);
                Ok(true)
            }
        }
    }

    fn is_destructive(&self, op: &str) -> bool {
        self.config.destructive_ops.iter().any(|d| d == op)
    }

    async fn guarded(
        &self,
        state: &WorkflowState,
        trigger: CheckpointTrigger,
        reason: String,
    ) -> Option<String> {
        let checkpoint =
            Checkpoint::capture(self.ids.checkpoint_id(), trigger, reason, state);
        match self.store.save(checkpoint).await {
            Ok(id) => {
                self.emit_saved(state, &id, trigger);
                Some(id)
            }
            Err(e) => {
                self.report_failure(state, trigger, &e);
                None
            }
        }
    }

    fn emit_saved(&self, state: &WorkflowState, id: &str, trigger: CheckpointTrigger) {
        let _ = self.events.send(Event::for_thread(
            EventScope::Checkpoint,
            &state.thread_id,
            state.step,
            format!("saved {id} ({trigger})"),
        ));
    }

    fn report_failure(&self, state: &WorkflowState, trigger: CheckpointTrigger, e: &CheckpointError) {
        tracing::warn!(
            thread = %state.thread_id,
            trigger = %trigger,
            error = %e,
            "checkpoint write failed; workflow continues"
        );
        let _ = self.events.send(Event::for_thread(
            EventScope::Checkpoint,
            &state.thread_id,
            state.step,
            format!("write failed ({trigger}): {e}"),
        ));
    }
}
