//! The workflow engine driver.
//!
//! Drives the node graph (`analyze -> route -> execute | parallel_dispatch
//! -> approve -> complete | fail`) to a terminal node or a suspension
//! point. Node handlers perform all side effects; the conditional edges
//! evaluated between them are the pure predicates in
//! [`machine`](crate::machine). Every meaningful transition is
//! checkpointed through the [`TriggerManager`] before the engine
//! advances.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::instrument;

use crate::approval::{ApprovalGate, ApprovalResponse, ApprovalStatus, ApprovalRequest, RoundOutcome};
use crate::checkpoint::{CheckpointError, CheckpointStore, InMemoryCheckpointStore, TriggerManager};
use crate::config::EngineConfig;
use crate::decision::DecisionAction;
use crate::dispatch::{DispatchCoordinator, DispatchJob, ParallelResult};
use crate::engine::recovery::{self, RecoveryError, RecoveryPhase};
use crate::events::{Event, EventScope, EventSender};
use crate::ids::IdGenerator;
use crate::machine::{self, WorkflowNode};
use crate::router::{DecisionPolicy, QueuePolicy, ThinkingRouter};
use crate::state::{
    AgentOutput, Analysis, ThinkingTrigger, WorkflowState, WorkflowStatus,
};
use crate::worker::{AcceptAllValidator, Validator, WorkerExecutor};

use miette::Diagnostic;
use thiserror::Error;

/// Role dispatched by the analyze node for the initial decomposition.
pub const ANALYST_ROLE: &str = "analyst";

/// Identity and input of a new workflow thread.
#[derive(Clone, Debug, Default)]
pub struct WorkflowInput {
    pub task_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub prompt: String,
}

impl WorkflowInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }
}

/// Options for [`WorkflowEngine::invoke`].
#[derive(Clone, Debug, Default)]
pub struct InvokeOptions {
    /// Thread to start or resume; generated when absent.
    pub thread_id: Option<String>,
    /// Resume from a specific historical checkpoint instead of the
    /// latest.
    pub checkpoint_id: Option<String>,
}

impl InvokeOptions {
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            checkpoint_id: None,
        }
    }

    #[must_use]
    pub fn at_checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// What a suspended thread is waiting for.
#[derive(Clone, Debug, PartialEq)]
pub enum WaitingFor {
    /// A human decision for the carried round.
    Approval(ApprovalRequest),
    /// An external signal delivered by re-invoking the thread.
    External,
    /// Caller-configured interrupt; re-invoking continues at `resume_at`.
    Interrupt { resume_at: WorkflowNode },
}

/// A suspension point: which node paused and why.
#[derive(Clone, Debug, PartialEq)]
pub struct Suspension {
    pub node: WorkflowNode,
    pub waiting_for: WaitingFor,
}

/// How a drive ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Suspended(Suspension),
}

/// Result of driving a thread: the state plus how the drive ended.
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    pub state: WorkflowState,
    pub outcome: RunOutcome,
}

impl WorkflowRun {
    /// The pending approval round, when suspended on one.
    #[must_use]
    pub fn pending_approval(&self) -> Option<&ApprovalRequest> {
        match &self.outcome {
            RunOutcome::Suspended(Suspension {
                waiting_for: WaitingFor::Approval(request),
                ..
            }) => Some(request),
            _ => None,
        }
    }
}

/// Report of a single [`WorkflowEngine::advance`] step.
#[derive(Clone, Debug)]
pub struct StepAdvance {
    /// Node whose handler ran.
    pub ran: WorkflowNode,
    /// Next node per the conditional edges; `None` after a terminal node.
    pub next: Option<WorkflowNode>,
    pub status: WorkflowStatus,
    pub suspension: Option<Suspension>,
    /// Worker outputs appended by this step.
    pub outputs_appended: usize,
}

/// Errors surfaced by the engine.
///
/// Worker failures are not errors at this level — they are folded into
/// `agent_outputs` and routed through the same conditional edges as
/// reported failures, so a thrown error and a `success: false` result
/// behave identically.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Approval(#[from] crate::approval::ApprovalError),

    #[error("a worker executor is required to build an engine")]
    #[diagnostic(
        code(loomflow::engine::missing_executor),
        help("Pass an executor to WorkflowEngine::builder().executor(..).")
    )]
    MissingExecutor,
}

/// The top-level orchestration driver.
///
/// One engine serves many threads; each thread's state lives in the
/// checkpoint store between calls, never inside the engine.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use loomflow::engine::{WorkflowEngine, WorkflowInput, InvokeOptions};
/// # async fn example(executor: Arc<dyn loomflow::worker::WorkerExecutor>)
/// # -> Result<(), loomflow::engine::EngineError> {
/// let engine = WorkflowEngine::builder().executor(executor).build()?;
///
/// let run = engine
///     .invoke(
///         WorkflowInput::new("Design and build a pricing page"),
///         InvokeOptions::thread("thread-42"),
///     )
///     .await?;
///
/// if let Some(request) = run.pending_approval() {
///     println!("waiting on approval round {}", request.id);
/// }
/// # Ok(())
/// # }
/// ```
pub struct WorkflowEngine {
    router: ThinkingRouter,
    dispatcher: DispatchCoordinator,
    gate: ApprovalGate,
    triggers: TriggerManager,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    events: EventSender,
    ids: IdGenerator,
}

impl WorkflowEngine {
    #[must_use]
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    /// The trigger manager, exposed so embedders can take manual
    /// checkpoints and guard their own destructive operations.
    #[must_use]
    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    /// Start a new thread or pick an existing one back up.
    ///
    /// With `checkpoint_id` set, that historical snapshot is restored
    /// instead of the latest one. A thread suspended on an approval
    /// round is returned as-is (still suspended); inject the decision
    /// with [`resume`](Self::resume).
    #[instrument(skip(self, input, options), err)]
    pub async fn invoke(
        &self,
        input: WorkflowInput,
        options: InvokeOptions,
    ) -> Result<WorkflowRun, EngineError> {
        let thread_id = options
            .thread_id
            .unwrap_or_else(|| self.ids.thread_id());

        if let Some(checkpoint_id) = options.checkpoint_id {
            let checkpoint = self.store.load(&checkpoint_id).await?;
            let state = recovery::validate_restored(checkpoint, &thread_id)?;
            return self.restart(state).await;
        }

        if let Some(checkpoint) = self.load_latest(&thread_id).await? {
            let state = recovery::validate_restored(checkpoint, &thread_id)?;
            return self.restart(state).await;
        }

        let state = WorkflowState::builder(&thread_id, &input.prompt)
            .task_id(&input.task_id)
            .tenant_id(&input.tenant_id)
            .project_id(&input.project_id)
            .max_retries(self.config.max_retries)
            .max_style_iterations(self.config.max_style_iterations)
            .build();
        let _ = self.events.send(Event::for_thread(
            EventScope::Engine,
            &thread_id,
            0,
            "workflow started",
        ));
        self.drive(state, WorkflowNode::Analyze).await
    }

    /// Inject a human decision into a suspended thread and re-enter the
    /// machine at the approval node.
    #[instrument(skip(self, response), err)]
    pub async fn resume(
        &self,
        thread_id: &str,
        response: ApprovalResponse,
    ) -> Result<WorkflowRun, EngineError> {
        let checkpoint = self.load_latest(thread_id).await?.ok_or_else(|| {
            RecoveryError::blocked(vec![format!(
                "no checkpoint recorded for thread {thread_id}"
            )])
        })?;
        self.resume_checkpoint(checkpoint, thread_id, response).await
    }

    /// Like [`resume`](Self::resume), but from a specific historical
    /// checkpoint instead of the latest.
    #[instrument(skip(self, response), err)]
    pub async fn resume_at(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
        response: ApprovalResponse,
    ) -> Result<WorkflowRun, EngineError> {
        let checkpoint = self.store.load(checkpoint_id).await?;
        self.resume_checkpoint(checkpoint, thread_id, response).await
    }

    async fn resume_checkpoint(
        &self,
        checkpoint: crate::checkpoint::Checkpoint,
        thread_id: &str,
        response: ApprovalResponse,
    ) -> Result<WorkflowRun, EngineError> {
        let mut state = recovery::validate_restored(checkpoint, thread_id)?;
        if state.status != WorkflowStatus::AwaitingApproval {
            return Err(RecoveryError::blocked(vec![
                format!(
                    "thread status is {}, not awaiting_approval",
                    state.status
                ),
                "a decision can only be injected while a round is pending".to_string(),
            ])
            .into());
        }
        state.approval_response = Some(response);
        self.drive(state, WorkflowNode::Approve).await
    }

    async fn restart(&self, state: WorkflowState) -> Result<WorkflowRun, EngineError> {
        match machine::entry_node(&state) {
            None => {
                let outcome = if state.status == WorkflowStatus::Completed {
                    RunOutcome::Completed
                } else {
                    RunOutcome::Failed
                };
                Ok(WorkflowRun { state, outcome })
            }
            Some(WorkflowNode::Approve) if state.approval_response.is_none() => {
                // Still waiting; hand the pending round back to the caller.
                let waiting_for = state
                    .pending_approval
                    .clone()
                    .map(WaitingFor::Approval)
                    .unwrap_or(WaitingFor::External);
                Ok(WorkflowRun {
                    state,
                    outcome: RunOutcome::Suspended(Suspension {
                        node: WorkflowNode::Approve,
                        waiting_for,
                    }),
                })
            }
            Some(entry) => self.drive(state, entry).await,
        }
    }

    async fn load_latest(
        &self,
        thread_id: &str,
    ) -> Result<Option<crate::checkpoint::Checkpoint>, EngineError> {
        match self.store.load_latest(thread_id).await {
            Ok(found) => Ok(found),
            Err(CheckpointError::Io { source }) => Err(RecoveryError::failed(
                RecoveryPhase::Filesystem,
                format!("checkpoint storage unreadable: {source}"),
            )
            .into()),
            Err(other) => Err(other.into()),
        }
    }

    /// Drive `state` from `entry` until a terminal node or a suspension.
    async fn drive(
        &self,
        mut state: WorkflowState,
        entry: WorkflowNode,
    ) -> Result<WorkflowRun, EngineError> {
        let mut node = entry;
        loop {
            let advance = self.advance(&mut state, node).await?;
            if let Some(suspension) = advance.suspension {
                return Ok(WorkflowRun {
                    state,
                    outcome: RunOutcome::Suspended(suspension),
                });
            }
            let Some(next) = advance.next else {
                break;
            };
            if self.config.interrupt_after.contains(&advance.ran) {
                if let Err(e) = self
                    .triggers
                    .checkpoint_now(&state, format!("interrupted after {}", advance.ran))
                    .await
                {
                    tracing::warn!(error = %e, "interrupt checkpoint failed");
                }
                return Ok(WorkflowRun {
                    state,
                    outcome: RunOutcome::Suspended(Suspension {
                        node: advance.ran,
                        waiting_for: WaitingFor::Interrupt { resume_at: next },
                    }),
                });
            }
            node = next;
        }

        let outcome = if state.status == WorkflowStatus::Completed {
            RunOutcome::Completed
        } else {
            RunOutcome::Failed
        };
        let _ = self.events.send(Event::for_thread(
            EventScope::Engine,
            &state.thread_id,
            state.step,
            format!("workflow finished: {}", state.status),
        ));
        Ok(WorkflowRun { state, outcome })
    }

    /// Run one node handler and evaluate the conditional edge after it.
    ///
    /// This is the stepwise surface for callers that drive a thread one
    /// node at a time; [`invoke`](Self::invoke) and
    /// [`resume`](Self::resume) loop over it.
    pub async fn advance(
        &self,
        state: &mut WorkflowState,
        node: WorkflowNode,
    ) -> Result<StepAdvance, EngineError> {
        let prev_status = state.status;
        let outputs_before = state.agent_outputs.len();

        let suspension = match node {
            WorkflowNode::Analyze => self.analyze_node(state).await,
            WorkflowNode::Route => self.route_node(state).await?,
            WorkflowNode::Execute | WorkflowNode::ParallelDispatch => {
                self.dispatch_node(state).await
            }
            WorkflowNode::Approve => self.approve_node(state).await?,
            WorkflowNode::Complete => self.complete_node(state),
            WorkflowNode::Fail => self.fail_node(state).await,
        };

        if state.status != prev_status {
            self.triggers
                .on_state_transition(state, prev_status, state.status)
                .await;
        }

        let next = if suspension.is_some() {
            None
        } else {
            machine::next_node(node, state)
        };
        Ok(StepAdvance {
            ran: node,
            next,
            status: state.status,
            suspension,
            outputs_appended: state.agent_outputs.len() - outputs_before,
        })
    }

    // ------------------------------------------------------------------
    // Node handlers (all side effects live here)
    // ------------------------------------------------------------------

    async fn analyze_node(&self, state: &mut WorkflowState) -> Option<Suspension> {
        state.status = WorkflowStatus::Analyzing;
        let job = DispatchJob {
            thread_id: state.thread_id.clone(),
            task: state.prompt.clone(),
            context: json!({ "phase": "analysis" }),
        };
        let targets = vec![crate::decision::DispatchTarget::role(ANALYST_ROLE)];
        let mut results = self.dispatcher.dispatch(&job, &targets).await;
        let result = results.remove(0);
        let succeeded = result.success;

        if succeeded {
            state.analysis = Analysis::from_value(&result.output);
            if state.analysis.is_none() {
                tracing::warn!(
                    thread = %state.thread_id,
                    "analysis output contained no usable decomposition"
                );
            }
        }
        self.record_result(state, result);
        if let Some(analysis) = &state.analysis {
            state.agent_queue = analysis.planned_roles.iter().cloned().collect();
        }
        state.last_trigger = if succeeded && state.analysis.is_some() {
            ThinkingTrigger::AgentCompleted
        } else {
            state.failure = Some(
                state
                    .last_output()
                    .and_then(|o| o.error.clone())
                    .unwrap_or_else(|| "analysis produced no usable plan".to_string()),
            );
            ThinkingTrigger::ErrorOccurred
        };
        self.triggers.on_agent_complete(state, ANALYST_ROLE).await;
        None
    }

    async fn route_node(&self, state: &mut WorkflowState) -> Result<Option<Suspension>, EngineError> {
        state.status = WorkflowStatus::Routing;
        state.pending_dispatch.clear();

        let trigger = state.last_trigger;
        let decision = self.router.decide(state, trigger);
        let _ = self.events.send(Event::for_thread(
            EventScope::Router,
            &state.thread_id,
            state.step + 1,
            format!("{} ({})", decision.action, trigger),
        ));
        let applied = decision.clone();
        state.record_thinking(trigger, decision);

        match applied.action {
            DecisionAction::Dispatch | DecisionAction::ParallelDispatch => {
                if machine::last_outcome_failed(state) {
                    // Router already verified the budget allows a retry.
                    state.retry_count = (state.retry_count + 1).min(state.max_retries);
                }
                for target in &applied.targets {
                    if let Some(pos) = state.agent_queue.iter().position(|r| r == &target.role) {
                        state.agent_queue.remove(pos);
                    }
                }
                state.current_agent = (applied.targets.len() == 1)
                    .then(|| applied.targets[0].role.clone());
                state.pending_dispatch = applied.targets;
            }
            DecisionAction::Approval => match applied.approval {
                Some(config) => match self.gate.open(&state.thread_id, config) {
                    Ok(request) => {
                        let _ = self.events.send(Event::for_thread(
                            EventScope::Approval,
                            &state.thread_id,
                            state.step,
                            format!("round {} opened ({:?})", request.id, request.config.kind),
                        ));
                        state.pending_approval = Some(request);
                    }
                    Err(e) => state.failure = Some(e.to_string()),
                },
                None => {
                    state.failure =
                        Some("approval decision carried no round configuration".to_string());
                }
            },
            DecisionAction::Complete => {
                state.status = WorkflowStatus::Completing;
                state.current_agent = None;
                state.completion_summary = applied
                    .summary
                    .or_else(|| state.completion_summary.clone())
                    .or_else(|| Some("workflow completed".to_string()));
            }
            DecisionAction::Fail => {
                state.failure = applied
                    .error
                    .or_else(|| Some("routing decided to fail".to_string()));
            }
            DecisionAction::Wait => {
                if let Err(e) = self
                    .triggers
                    .checkpoint_now(state, "suspended waiting for an external signal")
                    .await
                {
                    tracing::warn!(error = %e, "wait checkpoint failed");
                }
                return Ok(Some(Suspension {
                    node: WorkflowNode::Route,
                    waiting_for: WaitingFor::External,
                }));
            }
        }
        Ok(None)
    }

    async fn dispatch_node(&self, state: &mut WorkflowState) -> Option<Suspension> {
        state.status = WorkflowStatus::Executing;
        let targets = std::mem::take(&mut state.pending_dispatch);
        let job = DispatchJob {
            thread_id: state.thread_id.clone(),
            task: state.prompt.clone(),
            context: build_context(state),
        };
        let results = self.dispatcher.dispatch(&job, &targets).await;

        let fanned_out = results.len() > 1;
        let role_label = targets
            .first()
            .map(|t| t.role.clone())
            .unwrap_or_else(|| "unknown".to_string());
        for result in results {
            self.record_result(state, result);
        }
        state.current_agent = None;

        state.last_trigger = if machine::last_outcome_failed(state) {
            ThinkingTrigger::ErrorOccurred
        } else if fanned_out {
            ThinkingTrigger::ParallelCompleted
        } else {
            ThinkingTrigger::AgentCompleted
        };

        self.triggers.on_agent_complete(state, &role_label).await;
        if state.last_trigger == ThinkingTrigger::ErrorOccurred {
            let error = state
                .last_output()
                .and_then(|o| o.error.clone())
                .unwrap_or_else(|| "worker failed".to_string());
            self.triggers.on_error(state, &error).await;
        }
        None
    }

    async fn approve_node(
        &self,
        state: &mut WorkflowState,
    ) -> Result<Option<Suspension>, EngineError> {
        let Some(request) = state.pending_approval.clone() else {
            state.failure = Some("approval node reached without a pending round".to_string());
            return Ok(None);
        };

        let Some(response) = state.approval_response.take() else {
            // First entry: suspend. The checkpoint written here is the
            // continuation a later resume loads, so it is taken through
            // the always-on manual trigger rather than a toggleable one.
            state.status = WorkflowStatus::AwaitingApproval;
            if let Err(e) = self
                .triggers
                .checkpoint_now(state, format!("suspended on approval round {}", request.id))
                .await
            {
                tracing::warn!(
                    thread = %state.thread_id,
                    error = %e,
                    "suspension checkpoint failed; resume will be blocked until one succeeds"
                );
            }
            return Ok(Some(Suspension {
                node: WorkflowNode::Approve,
                waiting_for: WaitingFor::Approval(request),
            }));
        };

        let outcome = match self.gate.resolve(&request, &response) {
            Ok(outcome) => outcome,
            Err(e) => {
                state.approval_response = Some(response);
                return Err(e.into());
            }
        };

        state.pending_approval = None;
        match outcome {
            RoundOutcome::Approved { selected } => {
                state.last_approval = Some(ApprovalStatus::Approved);
                state.user_feedback = None;
                state.last_trigger = ThinkingTrigger::ApprovalReceived;
                let label = selected
                    .map(|o| format!("approved option {}", o.id))
                    .unwrap_or_else(|| "approved".to_string());
                let _ = self.events.send(Event::for_thread(
                    EventScope::Approval,
                    &state.thread_id,
                    state.step,
                    label.clone(),
                ));
                self.triggers.on_user_approval(state, &label).await;
            }
            RoundOutcome::Rejected {
                feedback,
                rejected_option_ids,
            } => {
                state.last_approval = Some(ApprovalStatus::Rejected);
                state.style_iteration_count =
                    (state.style_iteration_count + 1).min(state.max_style_iterations);
                for id in rejected_option_ids {
                    if !state.rejected_option_ids.contains(&id) {
                        state.rejected_option_ids.push(id);
                    }
                }
                state.user_feedback = feedback;
                state.last_trigger = ThinkingTrigger::ApprovalReceived;
                self.triggers.on_user_approval(state, "rejected").await;
            }
            RoundOutcome::Deferred => {
                state.last_approval = Some(ApprovalStatus::Deferred);
                state.last_trigger = ThinkingTrigger::ApprovalReceived;
                self.triggers.on_user_approval(state, "deferred").await;
            }
            RoundOutcome::TimedOut => {
                // Unresolved: the router sees a timeout trigger and
                // decides whether to retry, escalate, or fail.
                state.last_approval = None;
                state.last_trigger = ThinkingTrigger::Timeout;
                let _ = self.events.send(Event::for_thread(
                    EventScope::Approval,
                    &state.thread_id,
                    state.step,
                    format!("round {} expired unresolved", request.id),
                ));
            }
        }
        Ok(None)
    }

    fn complete_node(&self, state: &mut WorkflowState) -> Option<Suspension> {
        state.status = WorkflowStatus::Completed;
        if state.completion_summary.is_none() {
            state.completion_summary = Some(format!(
                "completed after {} worker output(s)",
                state.agent_outputs.len()
            ));
        }
        None
    }

    async fn fail_node(&self, state: &mut WorkflowState) -> Option<Suspension> {
        state.status = WorkflowStatus::Failed;
        if state.failure.is_none() {
            state.failure = state
                .last_output()
                .and_then(|o| o.error.clone())
                .or_else(|| Some("workflow failed".to_string()));
        }
        let failure = state.failure.clone().unwrap_or_default();
        self.triggers.on_error(state, &failure).await;
        None
    }

    fn record_result(&self, state: &mut WorkflowState, result: ParallelResult) {
        state.record_output(AgentOutput {
            role: result.agent_id,
            success: result.success,
            output: result.output,
            routing_hints: result.routing_hints,
            duration_ms: result.duration_ms,
            error: result.error,
            group_id: result.group_id,
            style: result.style,
        });
    }
}

fn build_context(state: &WorkflowState) -> Value {
    let mapping = state
        .thinking_history
        .last()
        .map(|step| step.decision.context_mapping.clone())
        .unwrap_or_default();
    json!({
        "context_mapping": mapping,
        "analysis": state.analysis.as_ref().map(|a| a.summary.clone()),
        "user_feedback": state.user_feedback,
        "rejected_options": state.rejected_option_ids,
    })
}

/// Builder wiring every collaborator explicitly.
///
/// Only the executor is mandatory; the other seams default to an
/// accept-all validator, the deterministic queue policy, an in-memory
/// store, and a detached event channel.
pub struct WorkflowEngineBuilder {
    executor: Option<Arc<dyn WorkerExecutor>>,
    validator: Arc<dyn Validator>,
    policy: Arc<dyn DecisionPolicy>,
    store: Option<Arc<dyn CheckpointStore>>,
    config: EngineConfig,
    events: Option<EventSender>,
}

impl Default for WorkflowEngineBuilder {
    fn default() -> Self {
        Self {
            executor: None,
            validator: Arc::new(AcceptAllValidator),
            policy: Arc::new(QueuePolicy),
            store: None,
            config: EngineConfig::default(),
            events: None,
        }
    }
}

impl WorkflowEngineBuilder {
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn WorkerExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<WorkflowEngine, EngineError> {
        let executor = self.executor.ok_or(EngineError::MissingExecutor)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new()));
        let events = self.events.unwrap_or_else(|| {
            let (tx, _rx) = flume::unbounded();
            tx
        });

        let dispatcher = DispatchCoordinator::new(
            executor,
            self.validator,
            self.config.max_parallel_agents,
            events.clone(),
        );
        let triggers = TriggerManager::new(
            store.clone(),
            self.config.triggers.clone(),
            events.clone(),
        );

        Ok(WorkflowEngine {
            router: ThinkingRouter::new(self.policy),
            dispatcher,
            gate: ApprovalGate::new(),
            triggers,
            store,
            config: self.config,
            events,
            ids: IdGenerator::new(),
        })
    }
}
