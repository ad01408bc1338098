//! The workflow state machine: named nodes and pure transition functions.
//!
//! The graph is fixed — `analyze`, `route`, `execute`,
//! `parallel_dispatch`, `approve`, `complete`, `fail` — and the
//! conditional edges are pure predicates over [`WorkflowState`]. All side
//! effects (worker calls, approval rounds, checkpoints) happen inside the
//! engine's node handlers; nothing here performs I/O or mutates state.
//!
//! Edge policy:
//! - after `analyze`: missing analysis goes to `fail`, otherwise `route`;
//! - after `route`: a recorded failure goes to `fail`; a pending approval
//!   round goes to `approve`; pending dispatch targets go to `execute`
//!   (one) or `parallel_dispatch` (many); nothing pending completes;
//! - after `execute`/`parallel_dispatch`: an unsuccessful outcome with the
//!   retry budget spent goes to `fail`; everything else returns to `route`
//!   (retries, approval rounds, and plan continuation are all expressed as
//!   fresh routing decisions);
//! - after `approve`: always back to `route` — the workflow may re-plan on
//!   both approval and rejection.
//!
//! A fan-out group counts as unsuccessful only when every member failed;
//! partial success is a valid outcome that flows onward to the approval
//! gate with reduced options.

use serde::{Deserialize, Serialize};

use crate::state::{WorkflowState, WorkflowStatus};

/// Named nodes of the workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    Analyze,
    Route,
    Execute,
    ParallelDispatch,
    Approve,
    Complete,
    Fail,
}

impl WorkflowNode {
    /// Stable string form used in persisted reports and events.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Route => "route",
            Self::Execute => "execute",
            Self::ParallelDispatch => "parallel_dispatch",
            Self::Approve => "approve",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }

    /// Decode a persisted string form; unknown input returns `None`.
    #[must_use]
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "analyze" => Some(Self::Analyze),
            "route" => Some(Self::Route),
            "execute" => Some(Self::Execute),
            "parallel_dispatch" => Some(Self::ParallelDispatch),
            "approve" => Some(Self::Approve),
            "complete" => Some(Self::Complete),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    /// Terminal nodes end the drive loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail)
    }
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encode())
    }
}

/// Conditional-edge evaluation: which node follows `ran` given `state`.
///
/// Returns `None` after a terminal node.
#[must_use]
pub fn next_node(ran: WorkflowNode, state: &WorkflowState) -> Option<WorkflowNode> {
    match ran {
        WorkflowNode::Analyze => Some(after_analyze(state)),
        WorkflowNode::Route => Some(after_route(state)),
        WorkflowNode::Execute | WorkflowNode::ParallelDispatch => Some(after_dispatch(state)),
        WorkflowNode::Approve => Some(WorkflowNode::Route),
        WorkflowNode::Complete | WorkflowNode::Fail => None,
    }
}

/// Entry node for a thread restored from a checkpoint.
///
/// `Executing` re-enters at `route` rather than `execute`: dispatch
/// targets are consumed before workers run, so re-deciding is always safe
/// while re-executing could duplicate side effects. The same reasoning
/// sends an `Analyzing` snapshot that already holds an analysis to
/// `route` instead of re-running the decomposition.
#[must_use]
pub fn entry_node(state: &WorkflowState) -> Option<WorkflowNode> {
    match state.status {
        WorkflowStatus::Pending => Some(WorkflowNode::Analyze),
        WorkflowStatus::Analyzing => Some(if state.analysis.is_some() {
            WorkflowNode::Route
        } else {
            WorkflowNode::Analyze
        }),
        WorkflowStatus::Routing | WorkflowStatus::Executing => Some(WorkflowNode::Route),
        WorkflowStatus::AwaitingApproval => Some(WorkflowNode::Approve),
        WorkflowStatus::Completing => Some(WorkflowNode::Complete),
        WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Aborted => None,
    }
}

fn after_analyze(state: &WorkflowState) -> WorkflowNode {
    if state.analysis.is_none() {
        WorkflowNode::Fail
    } else {
        WorkflowNode::Route
    }
}

fn after_route(state: &WorkflowState) -> WorkflowNode {
    if state.failure.is_some() {
        return WorkflowNode::Fail;
    }
    if state.pending_approval.is_some() {
        return WorkflowNode::Approve;
    }
    match state.pending_dispatch.len() {
        0 => WorkflowNode::Complete,
        1 => WorkflowNode::Execute,
        _ => WorkflowNode::ParallelDispatch,
    }
}

fn after_dispatch(state: &WorkflowState) -> WorkflowNode {
    if last_outcome_failed(state) && state.retries_exhausted() {
        return WorkflowNode::Fail;
    }
    WorkflowNode::Route
}

/// Whether the most recent dispatch outcome counts as failed: a single
/// unsuccessful output, or a fan-out group with zero successes.
#[must_use]
pub fn last_outcome_failed(state: &WorkflowState) -> bool {
    let Some(last) = state.last_output() else {
        return false;
    };
    match last.group_id.as_deref() {
        Some(group) => state.group_outputs(group).iter().all(|o| !o.success),
        None => !last.success,
    }
}
