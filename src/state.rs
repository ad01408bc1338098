//! Workflow state for the loomflow orchestration core.
//!
//! One [`WorkflowState`] exists per task thread. It is owned exclusively
//! by the engine while a thread is executing and persisted by the
//! checkpoint store between suspensions; no two threads ever share state.
//!
//! # Append-only history
//!
//! Two sequences are append-only and preserve causal order:
//! - [`WorkflowState::agent_outputs`] — one entry per finished worker
//!   call; the most recent entry drives routing decisions.
//! - [`WorkflowState::thinking_history`] — one [`ThinkingStep`] per
//!   routing decision; never mutated, sufficient to reconstruct why each
//!   transition happened.
//!
//! # Examples
//!
//! ```rust
//! use loomflow::state::WorkflowState;
//!
//! let state = WorkflowState::builder("thread-1", "Build a landing page")
//!     .task_id("task-9")
//!     .tenant_id("acme")
//!     .max_retries(2)
//!     .build();
//!
//! assert_eq!(state.thread_id, "thread-1");
//! assert!(state.agent_outputs.is_empty());
//! assert!(!state.status.is_terminal());
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::{ApprovalRequest, ApprovalResponse, ApprovalStatus};
use crate::decision::{DispatchTarget, OrchestratorDecision};

/// Lifecycle status of one workflow thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Analyzing,
    Routing,
    Executing,
    AwaitingApproval,
    Completing,
    Completed,
    Failed,
    Aborted,
}

impl WorkflowStatus {
    /// Terminal statuses never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Routing => "routing",
            Self::Executing => "executing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Worker-supplied signals consumed by the router.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingHints {
    /// The output should pass a human before the workflow continues.
    #[serde(default)]
    pub needs_approval: bool,
    /// The worker observed recoverable problems worth a second look.
    #[serde(default)]
    pub has_failures: bool,
    /// Roles the worker suggests running next, highest priority first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_next: Vec<String>,
}

/// One finished worker call, recorded in completion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub role: String,
    pub success: bool,
    /// Opaque worker output; the core never interprets it beyond hints.
    pub output: Value,
    #[serde(default)]
    pub routing_hints: RoutingHints,
    pub duration_ms: u64,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fan-out group this entry belongs to, if it came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Style variant for competition entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Why the router was invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingTrigger {
    Initial,
    AgentCompleted,
    ParallelCompleted,
    ApprovalReceived,
    ErrorOccurred,
    Timeout,
}

impl std::fmt::Display for ThinkingTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Initial => "initial",
            Self::AgentCompleted => "agent_completed",
            Self::ParallelCompleted => "parallel_completed",
            Self::ApprovalReceived => "approval_received",
            Self::ErrorOccurred => "error_occurred",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Task complexity estimated during decomposition; advisory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Structured output of the initial decomposition step.
///
/// Required before any routing happens; a thread whose analysis is still
/// missing after the analyze node ran goes straight to `fail`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Prose summary of the decomposed task.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    /// Static fallback plan: roles to run in order.
    #[serde(default)]
    pub planned_roles: Vec<String>,
    /// Roles that run as a style competition, mapped to their variants.
    /// A role listed here fans out to one worker per variant; the winner
    /// is picked at an approval gate.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub competitions: FxHashMap<String, Vec<String>>,
}

impl Analysis {
    /// Lenient boundary parse of a decomposition worker's output.
    ///
    /// Accepts an object with `summary`, `planned_roles` (also spelled
    /// `roles` or `agents`), optional `complexity` in any case, and
    /// optional `competitions` (`role -> [styles]`); a bare non-empty
    /// string becomes a summary-only analysis. Returns `None` when no
    /// usable decomposition can be extracted — the caller routes that to
    /// `fail`, it is never patched over.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(text) = value.as_str() {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            return Some(Self {
                summary: text.to_string(),
                complexity: None,
                planned_roles: Vec::new(),
                competitions: FxHashMap::default(),
            });
        }

        let obj = value.as_object()?;
        let summary = obj
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let planned_roles: Vec<String> = obj
            .get("planned_roles")
            .or_else(|| obj.get("roles"))
            .or_else(|| obj.get("agents"))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if summary.is_none() && planned_roles.is_empty() {
            return None;
        }

        let complexity = obj
            .get("complexity")
            .and_then(Value::as_str)
            .and_then(|raw| match raw.to_ascii_lowercase().as_str() {
                "low" => Some(Complexity::Low),
                "medium" => Some(Complexity::Medium),
                "high" => Some(Complexity::High),
                _ => None,
            });
        let competitions = obj
            .get("competitions")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(role, styles)| {
                        styles.as_array().map(|styles| {
                            (
                                role.clone(),
                                styles
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect::<Vec<_>>(),
                            )
                        })
                    })
                    .collect::<FxHashMap<_, _>>()
            })
            .unwrap_or_default();

        Some(Self {
            summary: summary.unwrap_or("decomposition").to_string(),
            complexity,
            planned_roles,
            competitions,
        })
    }
}

/// One routing decision plus the context it was made in.
///
/// Immutable once appended; `step` is monotonic per thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub trigger: ThinkingTrigger,
    /// Compact summary of the state the decision was based on.
    pub state_summary: String,
    /// Routing rationale (mirrors the decision's reasoning).
    pub reasoning: String,
    pub decision: OrchestratorDecision,
}

/// The full state of one workflow thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    // Immutable identity / input.
    pub thread_id: String,
    pub task_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub prompt: String,

    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,

    /// Role currently executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    /// Static fallback plan: ordered roles still to run.
    #[serde(default)]
    pub agent_queue: VecDeque<String>,

    /// Append-only record of finished worker calls.
    #[serde(default)]
    pub agent_outputs: Vec<AgentOutput>,

    pub retry_count: u32,
    pub max_retries: u32,

    /// Present only while/after an approval round; cleared once consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_response: Option<ApprovalResponse>,
    /// The round the thread is suspended on, if any. This is the
    /// persisted continuation: a resumed process reads it to know what
    /// the thread was waiting for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_approval: Option<ApprovalRequest>,

    /// Append-only audit trail of routing decisions.
    #[serde(default)]
    pub thinking_history: Vec<ThinkingStep>,

    /// Outcome of the most recently resolved round, driving the next
    /// routing decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_approval: Option<ApprovalStatus>,

    /// Rejection-loop bookkeeping; `style_iteration_count` never exceeds
    /// `max_style_iterations`.
    pub style_iteration_count: u32,
    pub max_style_iterations: u32,
    #[serde(default)]
    pub rejected_option_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,

    /// Targets accepted from the latest decision but not yet dispatched.
    #[serde(default)]
    pub pending_dispatch: Vec<DispatchTarget>,
    /// Trigger for the next routing decision.
    pub last_trigger: ThinkingTrigger,

    /// Monotonic step counter shared by thinking steps and reports.
    pub step: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Start building a fresh state for `thread_id` around `prompt`.
    pub fn builder(
        thread_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> WorkflowStateBuilder {
        WorkflowStateBuilder::new(thread_id, prompt)
    }

    /// Append a finished worker call.
    ///
    /// Entries from one fan-out may arrive in any relative order among
    /// themselves, but every entry of a group is recorded before the
    /// post-dispatch edge is evaluated.
    pub fn record_output(&mut self, output: AgentOutput) {
        self.agent_outputs.push(output);
        self.updated_at = Utc::now();
    }

    /// Append a thinking step for `decision`, assigning the next step
    /// number. Returns a reference to the appended step.
    pub fn record_thinking(
        &mut self,
        trigger: ThinkingTrigger,
        decision: OrchestratorDecision,
    ) -> &ThinkingStep {
        self.step += 1;
        let step = ThinkingStep {
            step: self.step,
            timestamp: Utc::now(),
            trigger,
            state_summary: self.summarize(),
            reasoning: decision.reasoning.clone(),
            decision,
        };
        self.thinking_history.push(step);
        self.updated_at = Utc::now();
        self.thinking_history
            .last()
            .expect("step was just appended")
    }

    /// The most recent worker output, if any.
    #[must_use]
    pub fn last_output(&self) -> Option<&AgentOutput> {
        self.agent_outputs.last()
    }

    /// Group id of the most recent output, when it came from a fan-out.
    #[must_use]
    pub fn last_group_id(&self) -> Option<&str> {
        self.last_output().and_then(|o| o.group_id.as_deref())
    }

    /// All outputs recorded for `group_id`, in completion order.
    #[must_use]
    pub fn group_outputs(&self, group_id: &str) -> Vec<&AgentOutput> {
        self.agent_outputs
            .iter()
            .filter(|o| o.group_id.as_deref() == Some(group_id))
            .collect()
    }

    /// Whether the retry budget is spent.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Whether the rejection-loop cap is reached.
    #[must_use]
    pub fn rejections_exhausted(&self) -> bool {
        self.style_iteration_count >= self.max_style_iterations
    }

    /// Compact state summary used in thinking steps and events.
    #[must_use]
    pub fn summarize(&self) -> String {
        format!(
            "status={} outputs={} queue={} retries={}/{} rejections={}/{}",
            self.status,
            self.agent_outputs.len(),
            self.agent_queue.len(),
            self.retry_count,
            self.max_retries,
            self.style_iteration_count,
            self.max_style_iterations,
        )
    }
}

/// Builder for [`WorkflowState`].
///
/// # Examples
///
/// ```rust
/// use loomflow::state::{WorkflowState, WorkflowStatus};
///
/// let state = WorkflowState::builder("thread-7", "Ship the checkout flow")
///     .project_id("proj-1")
///     .max_style_iterations(3)
///     .build();
///
/// assert_eq!(state.status, WorkflowStatus::Pending);
/// assert_eq!(state.max_style_iterations, 3);
/// ```
#[derive(Debug)]
pub struct WorkflowStateBuilder {
    thread_id: String,
    task_id: String,
    tenant_id: String,
    project_id: String,
    prompt: String,
    max_retries: u32,
    max_style_iterations: u32,
}

impl WorkflowStateBuilder {
    fn new(thread_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            task_id: String::new(),
            tenant_id: String::new(),
            project_id: String::new(),
            prompt: prompt.into(),
            max_retries: 3,
            max_style_iterations: 5,
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

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn max_style_iterations(mut self, max_style_iterations: u32) -> Self {
        self.max_style_iterations = max_style_iterations;
        self
    }

    #[must_use]
    pub fn build(self) -> WorkflowState {
        let now = Utc::now();
        WorkflowState {
            thread_id: self.thread_id,
            task_id: self.task_id,
            tenant_id: self.tenant_id,
            project_id: self.project_id,
            prompt: self.prompt,
            status: WorkflowStatus::Pending,
            analysis: None,
            current_agent: None,
            agent_queue: VecDeque::new(),
            agent_outputs: Vec::new(),
            retry_count: 0,
            max_retries: self.max_retries,
            approval_response: None,
            pending_approval: None,
            thinking_history: Vec::new(),
            last_approval: None,
            style_iteration_count: 0,
            max_style_iterations: self.max_style_iterations,
            rejected_option_ids: Vec::new(),
            user_feedback: None,
            pending_dispatch: Vec::new(),
            last_trigger: ThinkingTrigger::Initial,
            step: 0,
            failure: None,
            completion_summary: None,
            created_at: now,
            updated_at: now,
        }
    }
}
