//! The thinking router: dynamic routing decisions over accumulated state.
//!
//! The router replaces a static queue with a read-then-decide function:
//! given the full [`WorkflowState`] and the trigger that woke it, it
//! produces an [`OrchestratorDecision`]. It never mutates state — the
//! engine applies the decision's consequences and appends the
//! [`ThinkingStep`](crate::state::ThinkingStep).
//!
//! Two invariants are enforced here regardless of the configured policy:
//! - a failed outcome with the retry budget spent always yields `fail`;
//! - reaching the rejection-iteration cap always yields `fail`, never
//!   silent continuation.

use std::sync::Arc;

use crate::approval::{ApprovalConfig, ApprovalKind, ApprovalOption, ApprovalStatus};
use crate::decision::{DecisionAction, DispatchTarget, OrchestratorDecision};
use crate::machine::last_outcome_failed;
use crate::state::{ThinkingTrigger, WorkflowState};

/// The pluggable decision seam.
///
/// Implementations must be pure with respect to `state`: read, decide,
/// return. The default [`QueuePolicy`] is deterministic; embedders may
/// plug in richer engines (heuristics, learned models) behind the same
/// contract.
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, state: &WorkflowState, trigger: ThinkingTrigger) -> OrchestratorDecision;
}

/// Routes decisions through a policy while enforcing the retry and
/// rejection caps.
#[derive(Clone)]
pub struct ThinkingRouter {
    policy: Arc<dyn DecisionPolicy>,
}

impl Default for ThinkingRouter {
    fn default() -> Self {
        Self::new(Arc::new(QueuePolicy))
    }
}

impl ThinkingRouter {
    pub fn new(policy: Arc<dyn DecisionPolicy>) -> Self {
        Self { policy }
    }

    /// Produce the next decision for `state`.
    ///
    /// Cap violations short-circuit the policy; a policy returning a
    /// dispatch decision without targets is downgraded to `fail` rather
    /// than letting a malformed decision reach the engine.
    pub fn decide(&self, state: &WorkflowState, trigger: ThinkingTrigger) -> OrchestratorDecision {
        if let Some(forced) = self.forced_failure(state, trigger) {
            tracing::debug!(thread = %state.thread_id, trigger = %trigger, "router forced fail");
            return forced;
        }

        let decision = self.policy.decide(state, trigger);
        if matches!(
            decision.action,
            DecisionAction::Dispatch | DecisionAction::ParallelDispatch
        ) && decision.targets.is_empty()
        {
            return OrchestratorDecision::new(
                DecisionAction::Fail,
                "policy produced a dispatch decision without targets",
            )
            .with_error("invalid decision: dispatch without targets");
        }
        tracing::debug!(
            thread = %state.thread_id,
            trigger = %trigger,
            action = %decision.action,
            confidence = ?decision.confidence,
            "routing decision"
        );
        decision
    }

    fn forced_failure(
        &self,
        state: &WorkflowState,
        trigger: ThinkingTrigger,
    ) -> Option<OrchestratorDecision> {
        if last_outcome_failed(state) && state.retries_exhausted() {
            let error = state
                .last_output()
                .and_then(|o| o.error.clone())
                .unwrap_or_else(|| "worker failed".to_string());
            return Some(
                OrchestratorDecision::new(
                    DecisionAction::Fail,
                    format!(
                        "retry budget spent ({}/{}) after repeated worker failure",
                        state.retry_count, state.max_retries
                    ),
                )
                .with_error(error)
                .with_confidence(1.0),
            );
        }

        let rejection_pressure = matches!(trigger, ThinkingTrigger::Timeout)
            || (matches!(trigger, ThinkingTrigger::ApprovalReceived)
                && state.last_approval == Some(ApprovalStatus::Rejected));
        if rejection_pressure && state.rejections_exhausted() {
            return Some(
                OrchestratorDecision::new(
                    DecisionAction::Fail,
                    format!(
                        "rejection cap reached ({}/{}); escalating instead of iterating further",
                        state.style_iteration_count, state.max_style_iterations
                    ),
                )
                .with_error("approval iterations exhausted")
                .with_confidence(1.0),
            );
        }
        None
    }
}

/// Deterministic default policy.
///
/// Continues the analysis plan in queue order, honors worker-suggested
/// roles, runs style competitions as fan-outs followed by a selection
/// round, retries failed dispatches, and re-runs a rejected competition
/// with the user's feedback until the rejection cap forces escalation.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueuePolicy;

impl DecisionPolicy for QueuePolicy {
    fn decide(&self, state: &WorkflowState, trigger: ThinkingTrigger) -> OrchestratorDecision {
        match trigger {
            ThinkingTrigger::Timeout => self.on_timeout(state),
            ThinkingTrigger::ApprovalReceived => self.on_approval(state),
            ThinkingTrigger::Initial
            | ThinkingTrigger::AgentCompleted
            | ThinkingTrigger::ParallelCompleted
            | ThinkingTrigger::ErrorOccurred => self.on_progress(state),
        }
    }
}

impl QueuePolicy {
    fn on_timeout(&self, state: &WorkflowState) -> OrchestratorDecision {
        // Deadline expired with iterations remaining: ask again.
        match self.approval_for_last_outcome(state) {
            Some(config) => OrchestratorDecision::new(
                DecisionAction::Approval,
                "approval deadline expired; re-requesting the round",
            )
            .with_approval(config)
            .with_confidence(0.7),
            None => OrchestratorDecision::new(
                DecisionAction::Fail,
                "approval deadline expired and the round cannot be reconstructed",
            )
            .with_error("approval timed out"),
        }
    }

    fn on_approval(&self, state: &WorkflowState) -> OrchestratorDecision {
        match state.last_approval {
            Some(ApprovalStatus::Rejected) => self.rerun_rejected(state),
            Some(ApprovalStatus::Deferred) => match self.approval_for_last_outcome(state) {
                Some(config) => OrchestratorDecision::new(
                    DecisionAction::Approval,
                    "decision deferred by the user; re-presenting the round",
                )
                .with_approval(config)
                .with_confidence(0.6),
                None => OrchestratorDecision::new(
                    DecisionAction::Wait,
                    "decision deferred with nothing to re-present; waiting for an external resume",
                )
                .with_confidence(0.5),
            },
            _ => self.continue_plan(state),
        }
    }

    fn on_progress(&self, state: &WorkflowState) -> OrchestratorDecision {
        let Some(last) = state.last_output() else {
            return self.continue_plan(state);
        };

        if last_outcome_failed(state) {
            // Caps are the router's job; by the time the policy runs,
            // retries remain.
            let role = last.role.clone();
            let targets = match last.group_id.as_deref() {
                Some(group) => state
                    .group_outputs(group)
                    .iter()
                    .map(|o| {
                        let mut t = DispatchTarget::role(&o.role);
                        t.style = o.style.clone();
                        t
                    })
                    .collect(),
                None => vec![DispatchTarget::role(&role)],
            };
            let action = if targets.len() > 1 {
                DecisionAction::ParallelDispatch
            } else {
                DecisionAction::Dispatch
            };
            return OrchestratorDecision::new(
                action,
                format!(
                    "{role} failed (attempt {} of {}); retrying",
                    state.retry_count + 1,
                    state.max_retries
                ),
            )
            .with_targets(targets)
            .with_confidence(0.5);
        }

        if let Some(config) = self.approval_for_last_outcome(state) {
            return OrchestratorDecision::new(
                DecisionAction::Approval,
                "latest output requires a human decision before continuing",
            )
            .with_approval(config)
            .with_confidence(0.8);
        }

        self.continue_plan(state)
    }

    /// Build the approval round demanded by the latest outcome, if any.
    ///
    /// A settled fan-out of more than one candidate always goes through a
    /// style selection offering the successful candidates; a single
    /// output asks for confirmation only when its hints demand it.
    fn approval_for_last_outcome(&self, state: &WorkflowState) -> Option<ApprovalConfig> {
        let last = state.last_output()?;
        if let Some(group) = last.group_id.as_deref() {
            let outputs = state.group_outputs(group);
            if outputs.len() > 1 {
                let options: Vec<ApprovalOption> = outputs
                    .iter()
                    .filter(|o| o.success)
                    .enumerate()
                    .map(|(i, o)| {
                        let id = o
                            .style
                            .clone()
                            .unwrap_or_else(|| format!("{}-{}", o.role, i + 1));
                        ApprovalOption::new(id, o.role.clone()).with_preview(o.output.clone())
                    })
                    .collect();
                if options.is_empty() {
                    return None;
                }
                return Some(
                    ApprovalConfig::new(
                        ApprovalKind::StyleSelection,
                        format!("Select the preferred {} candidate", last.role),
                        state.max_style_iterations,
                    )
                    .with_options(options)
                    .with_iteration(state.style_iteration_count),
                );
            }
        }
        if last.routing_hints.needs_approval {
            return Some(
                ApprovalConfig::new(
                    ApprovalKind::Confirmation,
                    format!("Approve the output of {}?", last.role),
                    state.max_style_iterations,
                )
                .with_iteration(state.style_iteration_count),
            );
        }
        None
    }

    fn rerun_rejected(&self, state: &WorkflowState) -> OrchestratorDecision {
        let feedback = state
            .user_feedback
            .clone()
            .unwrap_or_else(|| "rejected without feedback".to_string());
        if let Some(group) = state.last_group_id() {
            let targets: Vec<DispatchTarget> = state
                .group_outputs(group)
                .iter()
                .map(|o| {
                    let mut t = DispatchTarget::role(&o.role);
                    t.style = o.style.clone();
                    t.context_refs = vec![format!("feedback:{feedback}")];
                    t
                })
                .collect();
            let action = if targets.len() > 1 {
                DecisionAction::ParallelDispatch
            } else {
                DecisionAction::Dispatch
            };
            return OrchestratorDecision::new(
                action,
                format!(
                    "options rejected (iteration {} of {}); regenerating with user feedback",
                    state.style_iteration_count, state.max_style_iterations
                ),
            )
            .with_targets(targets)
            .with_confidence(0.6);
        }
        let role = state
            .last_output()
            .map(|o| o.role.clone())
            .unwrap_or_else(|| "architect".to_string());
        OrchestratorDecision::new(
            DecisionAction::Dispatch,
            "output rejected; re-running the producing role with feedback",
        )
        .with_targets(vec![
            DispatchTarget::role(role).with_context_refs(vec![format!("feedback:{feedback}")]),
        ])
        .with_confidence(0.6)
    }

    fn continue_plan(&self, state: &WorkflowState) -> OrchestratorDecision {
        if let Some(last) = state.last_output()
            && let Some(suggested) = last.routing_hints.suggested_next.first()
        {
            return OrchestratorDecision::new(
                DecisionAction::Dispatch,
                format!("{} suggested running {suggested} next", last.role),
            )
            .with_targets(vec![DispatchTarget::role(suggested)])
            .with_confidence(0.7);
        }

        let Some(role) = state.agent_queue.front() else {
            return OrchestratorDecision::new(
                DecisionAction::Complete,
                "plan exhausted with no pending work",
            )
            .with_summary(format!(
                "completed after {} worker output(s)",
                state.agent_outputs.len()
            ))
            .with_confidence(0.9);
        };

        let styles = state
            .analysis
            .as_ref()
            .and_then(|a| a.competitions.get(role))
            .filter(|styles| styles.len() > 1);
        match styles {
            Some(styles) => {
                let targets = styles
                    .iter()
                    .map(|style| DispatchTarget::role(role).with_style(style))
                    .collect::<Vec<_>>();
                OrchestratorDecision::new(
                    DecisionAction::ParallelDispatch,
                    format!(
                        "running {role} as a {}-way style competition",
                        targets.len()
                    ),
                )
                .with_targets(targets)
                .with_confidence(0.8)
            }
            None => OrchestratorDecision::new(
                DecisionAction::Dispatch,
                format!("continuing the plan with {role}"),
            )
            .with_targets(vec![DispatchTarget::role(role)])
            .with_confidence(0.9),
        }
    }
}
